//! `PgStore` — Postgres implementation of [`Store`].
//!
//! Queries are runtime-checked (`sqlx::query`/`query_as` without macros)
//! so the workspace compiles without a live database. Schema lives in the
//! workspace-root `migrations/` directory and is embedded via
//! `sqlx::migrate!`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::models::{AgentRow, FlowRow, RunRecord, RunStatus, StepLog};
use crate::traits::Store;
use crate::StoreError;

/// Create a new connection pool from the given `database_url`.
///
/// `max_connections` controls the pool ceiling.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    info!("Connecting to database (max_connections={})", max_connections);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run embedded migrations located in `./migrations` (relative to the
/// workspace root at build time).
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    info!("Running database migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_flow(&self, name: &str, definition: Value) -> Result<FlowRow, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO flows (id, name, definition, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4)",
        )
        .bind(id)
        .bind(name)
        .bind(&definition)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(FlowRow {
            id,
            name: name.to_string(),
            definition,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_flow(&self, id: Uuid) -> Result<FlowRow, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, definition, created_at, updated_at FROM flows WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(FlowRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            definition: row.try_get("definition")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn update_flow(&self, id: Uuid, definition: Value) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE flows SET definition = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(&definition)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_agent(&self, name: &str, definition: Value) -> Result<AgentRow, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO agents (id, name, definition, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(name)
        .bind(&definition)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(AgentRow {
            id,
            name: name.to_string(),
            definition,
            created_at: now,
        })
    }

    async fn get_agent(&self, id: Uuid) -> Result<AgentRow, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, definition, created_at FROM agents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(AgentRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            definition: row.try_get("definition")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn create_run(
        &self,
        flow_id: Uuid,
        parent_run_id: Option<Uuid>,
        input: Value,
    ) -> Result<RunRecord, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO runs (id, flow_id, parent_run_id, status, input, steps, started_at) \
             VALUES ($1, $2, $3, $4, $5, '[]'::jsonb, $6)",
        )
        .bind(id)
        .bind(flow_id)
        .bind(parent_run_id)
        .bind(RunStatus::Running.to_string())
        .bind(&input)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(RunRecord {
            id,
            flow_id,
            parent_run_id,
            status: RunStatus::Running,
            input,
            steps: Vec::new(),
            final_data: None,
            error: None,
            started_at: now,
            finished_at: None,
        })
    }

    async fn append_step(&self, run_id: Uuid, step: &StepLog) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE runs SET steps = steps || jsonb_build_array($2::jsonb) WHERE id = $1",
        )
        .bind(run_id)
        .bind(serde_json::to_value(step)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        final_data: Option<Value>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE runs SET status = $2, final_data = $3, error = $4, finished_at = $5 \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(run_id)
        .bind(status.to_string())
        .bind(final_data)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing run from one finalized earlier.
            let exists = sqlx::query("SELECT 1 FROM runs WHERE id = $1")
                .bind(run_id)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            return Err(if exists {
                StoreError::AlreadyFinalized
            } else {
                StoreError::NotFound
            });
        }
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<RunRecord, StoreError> {
        let row = sqlx::query(
            "SELECT id, flow_id, parent_run_id, status, input, steps, final_data, error, \
             started_at, finished_at FROM runs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        run_from_row(&row)
    }
}

fn run_from_row(row: &PgRow) -> Result<RunRecord, StoreError> {
    let status: String = row.try_get("status")?;
    let status: RunStatus = status
        .parse()
        .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

    let steps: Value = row.try_get("steps")?;
    let steps: Vec<StepLog> = serde_json::from_value(steps)?;

    Ok(RunRecord {
        id: row.try_get("id")?,
        flow_id: row.try_get("flow_id")?,
        parent_run_id: row.try_get::<Option<Uuid>, _>("parent_run_id")?,
        status,
        input: row.try_get("input")?,
        steps,
        final_data: row.try_get::<Option<Value>, _>("final_data")?,
        error: row.try_get::<Option<String>, _>("error")?,
        started_at: row.try_get::<DateTime<Utc>, _>("started_at")?,
        finished_at: row.try_get::<Option<DateTime<Utc>>, _>("finished_at")?,
    })
}
