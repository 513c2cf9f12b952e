//! `flowforge` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — structurally validate a flow JSON file.
//! - `run`      — execute a flow JSON file in-process (memory store).
//! - `develop`  — resolve a stored flow's agent nodes via an authoring
//!                service.
//! - `migrate`  — run pending database migrations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use engine::{
    ExecutorConfig, FlowDeveloper, FlowExecutor, FlowSpec, HttpAuthoring, HttpOracle,
    OfflineOracle, SemanticOracle,
};
use store::{MemoryStore, PgStore, Store};

#[derive(Parser)]
#[command(
    name = "flowforge",
    about = "Flow and agent execution engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a flow definition JSON file.
    Validate {
        /// Path to the flow JSON file.
        path: PathBuf,
    },
    /// Execute a flow definition JSON file against an in-memory store.
    Run {
        /// Path to the flow JSON file.
        path: PathBuf,
        /// Initial input data as inline JSON.
        #[arg(long, default_value = "{}")]
        input: String,
        /// Agent definition JSON files to seed (documents may carry an
        /// `id` matching the flow's `agent_ref`s).
        #[arg(long = "agent")]
        agents: Vec<PathBuf>,
        /// Override the step bound.
        #[arg(long)]
        max_steps: Option<u32>,
        /// Semantic-oracle endpoint for natural-language conditions;
        /// without it such conditions never match.
        #[arg(long)]
        oracle_url: Option<String>,
    },
    /// Resolve a stored flow's unresolved agent nodes.
    Develop {
        /// Flow id in the database.
        #[arg(long)]
        flow_id: Uuid,
        /// Agent-authoring service endpoint.
        #[arg(long)]
        authoring_url: String,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let flow = read_flow(&path)?;
            engine::validate_flow(&flow)?;
            println!("flow '{}' is valid ({} nodes, {} edges)", flow.name, flow.nodes.len(), flow.edges.len());
        }

        Command::Run {
            path,
            input,
            agents,
            max_steps,
            oracle_url,
        } => {
            let flow = read_flow(&path)?;
            let input: serde_json::Value =
                serde_json::from_str(&input).context("--input is not valid JSON")?;

            let store = Arc::new(MemoryStore::new());
            for agent_path in &agents {
                seed_agent_file(&store, agent_path).await?;
            }
            store
                .seed_flow(flow.id, &flow.name, flow.to_definition()?)
                .await;

            let oracle: Arc<dyn SemanticOracle> = match oracle_url {
                Some(url) => Arc::new(HttpOracle::new(url, Duration::from_secs(30))?),
                None => Arc::new(OfflineOracle),
            };

            let mut config = ExecutorConfig::default();
            if let Some(bound) = max_steps {
                config.max_steps = bound;
            }

            let executor = FlowExecutor::new(store, oracle, config);
            let outcome = executor.run(&flow, input).await?;

            let report = serde_json::json!({
                "run_id": outcome.run_id,
                "status": outcome.status,
                "final_data": outcome.final_data,
                "steps": outcome.steps,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Develop {
            flow_id,
            authoring_url,
            database_url,
        } => {
            let pool = store::postgres::create_pool(&database_url, 10).await?;
            let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
            let authoring = Arc::new(HttpAuthoring::new(authoring_url, Duration::from_secs(300))?);

            let developer = FlowDeveloper::new(store, authoring);
            let report = developer.develop(flow_id).await?;

            info!(resolved = report.resolved, failed = report.failed, "development finished");
            for node in &report.nodes {
                match (&node.agent_id, &node.error) {
                    (Some(agent_id), _) => println!("✅ {} -> agent {agent_id}", node.node_id),
                    (None, Some(error)) => println!("❌ {}: {error}", node.node_id),
                    (None, None) => {}
                }
            }
            if report.failed > 0 {
                std::process::exit(1);
            }
        }

        Command::Migrate { database_url } => {
            let pool = store::postgres::create_pool(&database_url, 2).await?;
            store::postgres::run_migrations(&pool).await?;
            info!("Migrations applied successfully");
        }
    }

    Ok(())
}

fn read_flow(path: &PathBuf) -> anyhow::Result<FlowSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let flow: FlowSpec = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a valid flow definition", path.display()))?;
    Ok(flow)
}

/// Seed one agent document. If the file carries an `id`, the agent is
/// installed under it so the flow's `agent_ref`s can point at it.
async fn seed_agent_file(store: &MemoryStore, path: &PathBuf) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let definition: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let id = definition
        .get("id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let name = definition
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unnamed")
        .to_string();

    store.seed_agent(id, &name, definition).await;
    info!(agent = %name, id = %id, "agent seeded");
    Ok(())
}
