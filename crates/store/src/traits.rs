//! The `Store` trait — the persistence contract injected into the engine.
//!
//! Defined here (rather than as free functions over a concrete pool) so
//! the executor, agent runtime and run ledger all depend on an interface
//! whose lifecycle is owned by process bootstrap.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{AgentRow, FlowRow, RunRecord, RunStatus, StepLog};
use crate::StoreError;

/// Persistence operations the engine needs. Row lookups that miss return
/// [`StoreError::NotFound`].
#[async_trait]
pub trait Store: Send + Sync {
    // ------ flows ------

    /// Insert a new flow document, assigning its id.
    async fn create_flow(&self, name: &str, definition: Value) -> Result<FlowRow, StoreError>;

    /// Fetch a flow by its primary key.
    async fn get_flow(&self, id: Uuid) -> Result<FlowRow, StoreError>;

    /// Replace a flow's definition (the one-time `agent_ref` write-back
    /// after development).
    async fn update_flow(&self, id: Uuid, definition: Value) -> Result<(), StoreError>;

    // ------ agents ------

    /// Insert a new agent document, assigning its id.
    async fn create_agent(&self, name: &str, definition: Value) -> Result<AgentRow, StoreError>;

    /// Fetch an agent by its primary key.
    async fn get_agent(&self, id: Uuid) -> Result<AgentRow, StoreError>;

    // ------ runs ------

    /// Create a run ledger in `running` status with an input snapshot.
    async fn create_run(
        &self,
        flow_id: Uuid,
        parent_run_id: Option<Uuid>,
        input: Value,
    ) -> Result<RunRecord, StoreError>;

    /// Append one entry to a run's execution log.
    async fn append_step(&self, run_id: Uuid, step: &StepLog) -> Result<(), StoreError>;

    /// Finalize a run exactly once. A second finalization (or finalizing
    /// a missing run) is [`StoreError::AlreadyFinalized`] /
    /// [`StoreError::NotFound`].
    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        final_data: Option<Value>,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// Fetch a run by its primary key.
    async fn get_run(&self, id: Uuid) -> Result<RunRecord, StoreError>;
}
