//! Flow execution engine.
//!
//! `FlowExecutor` is the central orchestrator:
//! 1. Validates the flow and refuses to start while agent nodes are
//!    unresolved.
//! 2. Creates the run ledger, then walks the graph from the entry node,
//!    dispatching each node by kind (agent / nested flow / passthrough).
//! 3. Persists a step-log entry per node and asks the edge router for
//!    the next node.
//! 4. Stops on node failure (`failed`), no matching edge (`completed`),
//!    or the step bound (`timeout`).
//!
//! Within one run execution is strictly sequential — node N+1's input is
//! node N's output, and branching is exclusive-or. Across runs nothing
//! is shared but the store, so many runs may execute concurrently.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use store::models::{RunStatus, StepLog, StepStatus};
use store::Store;

use crate::agent::{load_agent, AgentHandle};
use crate::models::{FlowSpec, NodeKind, NodeSpec};
use crate::router::EdgeRouter;
use crate::services::SemanticOracle;
use crate::{validate, EngineError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of node executions per run; guards routing cycles.
    /// Hitting it finishes the run as `timeout`, not `failed`.
    pub max_steps: u32,
    /// Maximum nesting of flow nodes; guards self-referencing flows.
    pub max_depth: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            max_depth: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Output of a completed run
// ---------------------------------------------------------------------------

/// The result of one flow run. Mirrors what the ledger recorded; a
/// `failed` run still carries every step that preceded the failure.
#[derive(Debug)]
pub struct RunOutcome {
    /// ID of the ledger created for this run.
    pub run_id: Uuid,
    pub status: RunStatus,
    /// The data held when the run stopped.
    pub final_data: Value,
    /// Per-node log in execution order.
    pub steps: Vec<StepLog>,
}

// ---------------------------------------------------------------------------
// FlowExecutor
// ---------------------------------------------------------------------------

/// Walks one flow spec at a time. Construct once and share; each call to
/// [`FlowExecutor::run`] owns its ledger and its agent registries.
pub struct FlowExecutor {
    store: Arc<dyn Store>,
    router: EdgeRouter,
    config: ExecutorConfig,
}

impl FlowExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        oracle: Arc<dyn SemanticOracle>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            router: EdgeRouter::new(oracle),
            config,
        }
    }

    /// Execute `flow` with `input` as the initial data.
    ///
    /// # Errors
    /// Pre-start conditions only: structural validation, an unresolved
    /// agent node, or a store failure. Failures inside a node finish the
    /// run as `failed` and are reported through the returned outcome.
    #[instrument(skip(self, flow, input), fields(flow_id = %flow.id, flow_name = %flow.name))]
    pub async fn run(&self, flow: &FlowSpec, input: Value) -> Result<RunOutcome, EngineError> {
        self.run_nested(flow, input, None, 0).await
    }

    fn run_nested<'a>(
        &'a self,
        flow: &'a FlowSpec,
        input: Value,
        parent_run_id: Option<Uuid>,
        depth: u32,
    ) -> Pin<Box<dyn Future<Output = Result<RunOutcome, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            if depth >= self.config.max_depth {
                return Err(EngineError::DepthExceeded(self.config.max_depth));
            }

            validate::validate_flow(flow)?;

            // Unresolved agent nodes block execution before any ledger
            // entry exists.
            if let Some(node) = flow.unresolved_agent_nodes().next() {
                return Err(EngineError::UnresolvedAgentNode {
                    node_id: node.id.clone(),
                });
            }

            let entry = validate::resolve_entry(flow)
                .ok_or(EngineError::NoEntryPoint)?
                .to_string();

            let run = self
                .store
                .create_run(flow.id, parent_run_id, input.clone())
                .await?;
            info!(run_id = %run.id, entry = %entry, "run started");

            let mut current_data = input;
            let mut current_node_id = entry;
            let mut steps: Vec<StepLog> = Vec::new();
            // Agents are materialized lazily, at most once per run.
            let mut agents: HashMap<Uuid, AgentHandle> = HashMap::new();

            loop {
                let Some(node) = flow.node(&current_node_id) else {
                    // Edges are validated, so this only fires on a spec
                    // mutated underneath us; close the ledger cleanly.
                    let message = format!("node '{current_node_id}' not found in flow");
                    error!(run_id = %run.id, "{message}");
                    self.store
                        .finish_run(run.id, RunStatus::Failed, None, Some(message))
                        .await?;
                    return Ok(RunOutcome {
                        run_id: run.id,
                        status: RunStatus::Failed,
                        final_data: current_data,
                        steps,
                    });
                };

                info!(node_id = %node.id, node_name = %node.name, "executing node");
                let step_index = steps.len() as u32 + 1;

                let result = match node.kind {
                    NodeKind::Agent => {
                        self.invoke_agent(node, &mut agents, &current_data).await
                    }
                    NodeKind::Flow => {
                        self.invoke_nested_flow(node, &current_data, run.id, depth)
                            .await
                    }
                    NodeKind::Passthrough => Ok(current_data.clone()),
                };

                match result {
                    Ok(output) => {
                        let step = StepLog {
                            node_id: node.id.clone(),
                            node_name: node.name.clone(),
                            input: current_data.clone(),
                            output: Some(output.clone()),
                            error: None,
                            status: StepStatus::Success,
                            step_index,
                        };
                        self.store.append_step(run.id, &step).await?;
                        steps.push(step);
                        current_data = output;
                    }
                    Err(message) => {
                        error!(node_id = %node.id, error = %message, "node failed");
                        let step = StepLog {
                            node_id: node.id.clone(),
                            node_name: node.name.clone(),
                            input: current_data.clone(),
                            output: None,
                            error: Some(message.clone()),
                            status: StepStatus::Failed,
                            step_index,
                        };
                        self.store.append_step(run.id, &step).await?;
                        steps.push(step);
                        self.store
                            .finish_run(run.id, RunStatus::Failed, None, Some(message))
                            .await?;
                        return Ok(RunOutcome {
                            run_id: run.id,
                            status: RunStatus::Failed,
                            final_data: current_data,
                            steps,
                        });
                    }
                }

                match self
                    .router
                    .route(&flow.edges, &current_node_id, &current_data)
                    .await
                {
                    Some(next) => {
                        if steps.len() as u32 >= self.config.max_steps {
                            warn!(
                                run_id = %run.id,
                                bound = self.config.max_steps,
                                next = %next,
                                "step bound reached; run did not converge"
                            );
                            self.store
                                .finish_run(
                                    run.id,
                                    RunStatus::Timeout,
                                    Some(current_data.clone()),
                                    None,
                                )
                                .await?;
                            return Ok(RunOutcome {
                                run_id: run.id,
                                status: RunStatus::Timeout,
                                final_data: current_data,
                                steps,
                            });
                        }
                        current_node_id = next;
                    }
                    None => {
                        info!(run_id = %run.id, steps = steps.len(), "run complete");
                        self.store
                            .finish_run(
                                run.id,
                                RunStatus::Completed,
                                Some(current_data.clone()),
                                None,
                            )
                            .await?;
                        return Ok(RunOutcome {
                            run_id: run.id,
                            status: RunStatus::Completed,
                            final_data: current_data,
                            steps,
                        });
                    }
                }
            }
        })
    }

    // -----------------------------------------------------------------------
    // Node dispatch
    // -----------------------------------------------------------------------

    /// Invoke an agent node. Any failure — a missing agent row, a
    /// fragment that won't materialize, a raising node body — is a
    /// node-level failure, not an engine error.
    async fn invoke_agent(
        &self,
        node: &NodeSpec,
        agents: &mut HashMap<Uuid, AgentHandle>,
        data: &Value,
    ) -> Result<Value, String> {
        let agent_id = node
            .agent_ref
            .ok_or_else(|| format!("agent node '{}' has no agent attached", node.id))?;

        let handle = match agents.entry(agent_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let row = self
                    .store
                    .get_agent(agent_id)
                    .await
                    .map_err(|e| format!("agent {agent_id}: {e}"))?;
                let spec = crate::models::AgentSpec::from_definition(&row.definition)
                    .map_err(|e| e.to_string())?;
                let handle = load_agent(&spec).map_err(|e| e.to_string())?;
                entry.insert(handle)
            }
        };
        // Static node parameters are defaults under the dynamic data.
        let merged = dsl::registry::merge_params(&node.parameters, data.clone());
        handle.invoke(merged).map_err(|e| e.to_string())
    }

    /// Recurse into a nested flow; its `final_data` becomes the node
    /// output, and its ledger links back to this run.
    async fn invoke_nested_flow(
        &self,
        node: &NodeSpec,
        data: &Value,
        parent_run_id: Uuid,
        depth: u32,
    ) -> Result<Value, String> {
        let flow_id = node
            .flow_ref
            .ok_or_else(|| format!("flow node '{}' has no flow attached", node.id))?;

        let row = self
            .store
            .get_flow(flow_id)
            .await
            .map_err(|e| format!("nested flow {flow_id}: {e}"))?;
        let nested = FlowSpec::from_row(&row).map_err(|e| e.to_string())?;

        let outcome = self
            .run_nested(&nested, data.clone(), Some(parent_run_id), depth + 1)
            .await
            .map_err(|e| e.to_string())?;

        match outcome.status {
            RunStatus::Completed => Ok(outcome.final_data),
            status => Err(format!(
                "nested run {} ended with status '{status}'",
                outcome.run_id
            )),
        }
    }
}
