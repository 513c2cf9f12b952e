//! `MemoryStore` — in-process implementation of [`Store`].
//!
//! Used by the engine's tests and by the CLI when running a flow straight
//! from a file. Seeding helpers let callers install documents under known
//! ids, which the trait deliberately does not allow.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{AgentRow, FlowRow, RunRecord, RunStatus, StepLog};
use crate::traits::Store;
use crate::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    flows: RwLock<HashMap<Uuid, FlowRow>>,
    agents: RwLock<HashMap<Uuid, AgentRow>>,
    runs: RwLock<HashMap<Uuid, RunRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a flow under a caller-chosen id.
    pub async fn seed_flow(&self, id: Uuid, name: &str, definition: Value) {
        let now = Utc::now();
        self.flows.write().await.insert(
            id,
            FlowRow {
                id,
                name: name.to_string(),
                definition,
                created_at: now,
                updated_at: now,
            },
        );
    }

    /// Install an agent under a caller-chosen id.
    pub async fn seed_agent(&self, id: Uuid, name: &str, definition: Value) {
        self.agents.write().await.insert(
            id,
            AgentRow {
                id,
                name: name.to_string(),
                definition,
                created_at: Utc::now(),
            },
        );
    }

    /// Number of run ledgers ever created (test inspection).
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Snapshot of every run ledger (test inspection).
    pub async fn runs(&self) -> Vec<RunRecord> {
        self.runs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_flow(&self, name: &str, definition: Value) -> Result<FlowRow, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let row = FlowRow {
            id,
            name: name.to_string(),
            definition,
            created_at: now,
            updated_at: now,
        };
        self.flows.write().await.insert(id, row.clone());
        Ok(row)
    }

    async fn get_flow(&self, id: Uuid) -> Result<FlowRow, StoreError> {
        self.flows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_flow(&self, id: Uuid, definition: Value) -> Result<(), StoreError> {
        let mut flows = self.flows.write().await;
        let row = flows.get_mut(&id).ok_or(StoreError::NotFound)?;
        row.definition = definition;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn create_agent(&self, name: &str, definition: Value) -> Result<AgentRow, StoreError> {
        let id = Uuid::new_v4();
        let row = AgentRow {
            id,
            name: name.to_string(),
            definition,
            created_at: Utc::now(),
        };
        self.agents.write().await.insert(id, row.clone());
        Ok(row)
    }

    async fn get_agent(&self, id: Uuid) -> Result<AgentRow, StoreError> {
        self.agents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_run(
        &self,
        flow_id: Uuid,
        parent_run_id: Option<Uuid>,
        input: Value,
    ) -> Result<RunRecord, StoreError> {
        let run = RunRecord {
            id: Uuid::new_v4(),
            flow_id,
            parent_run_id,
            status: RunStatus::Running,
            input,
            steps: Vec::new(),
            final_data: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        self.runs.write().await.insert(run.id, run.clone());
        Ok(run)
    }

    async fn append_step(&self, run_id: Uuid, step: &StepLog) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(&run_id).ok_or(StoreError::NotFound)?;
        run.steps.push(step.clone());
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        final_data: Option<Value>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(&run_id).ok_or(StoreError::NotFound)?;
        if run.status != RunStatus::Running {
            return Err(StoreError::AlreadyFinalized);
        }
        run.status = status;
        run.final_data = final_data;
        run.error = error;
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<RunRecord, StoreError> {
        self.runs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::models::StepStatus;

    #[tokio::test]
    async fn run_ledger_lifecycle() {
        let store = MemoryStore::new();
        let run = store
            .create_run(Uuid::new_v4(), None, json!({ "x": 1 }))
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Running);

        let step = StepLog {
            node_id: "a".into(),
            node_name: "A".into(),
            input: json!({ "x": 1 }),
            output: Some(json!({ "x": 2 })),
            error: None,
            status: StepStatus::Success,
            step_index: 1,
        };
        store.append_step(run.id, &step).await.unwrap();

        store
            .finish_run(run.id, RunStatus::Completed, Some(json!({ "x": 2 })), None)
            .await
            .unwrap();

        let stored = store.get_run(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(stored.steps.len(), 1);
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn a_run_is_finalized_exactly_once() {
        let store = MemoryStore::new();
        let run = store.create_run(Uuid::new_v4(), None, json!({})).await.unwrap();

        store
            .finish_run(run.id, RunStatus::Completed, None, None)
            .await
            .unwrap();

        let second = store
            .finish_run(run.id, RunStatus::Failed, None, Some("late".into()))
            .await;
        assert!(matches!(second, Err(StoreError::AlreadyFinalized)));

        // The first finalization is untouched.
        let stored = store.get_run(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_flow(Uuid::new_v4()).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_agent(Uuid::new_v4()).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.append_step(Uuid::new_v4(), &StepLog {
                node_id: "x".into(),
                node_name: "X".into(),
                input: json!({}),
                output: None,
                error: None,
                status: StepStatus::Success,
                step_index: 1,
            }).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_flow_replaces_the_definition() {
        let store = MemoryStore::new();
        let row = store.create_flow("f", json!({ "v": 1 })).await.unwrap();
        store.update_flow(row.id, json!({ "v": 2 })).await.unwrap();
        let fetched = store.get_flow(row.id).await.unwrap();
        assert_eq!(fetched.definition, json!({ "v": 2 }));
    }
}
