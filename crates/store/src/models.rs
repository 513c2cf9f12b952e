//! Row and ledger structs that map 1-to-1 onto stored documents.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Flow/agent domain types live in the `engine` crate and are serialised
//! into the `definition` column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// flows
// ---------------------------------------------------------------------------

/// A persisted flow definition row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRow {
    pub id: Uuid,
    pub name: String,
    /// Full JSON flow document (entry point, nodes, edges, status, …)
    pub definition: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// agents
// ---------------------------------------------------------------------------

/// A persisted agent definition row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRow {
    pub id: Uuid,
    pub name: String,
    /// Full JSON agent document (nodes, entry function, …)
    pub definition: Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

/// Possible statuses for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Timeout,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            "timeout"   => Ok(Self::Timeout),
            other       => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Per-step status inside a run's execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

/// One entry of a run's append-only execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLog {
    pub node_id: String,
    pub node_name: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: StepStatus,
    pub step_index: u32,
}

/// The persisted ledger of one execution. Created `running` with an input
/// snapshot, appended per step, finalized exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub flow_id: Uuid,
    /// Set on nested-flow runs for traceability back to the parent run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<Uuid>,
    pub status: RunStatus,
    pub input: Value,
    pub steps: Vec<StepLog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
