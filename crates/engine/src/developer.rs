//! Flow development — resolving agent nodes that have no agent yet.
//!
//! Each unresolved node gets an independent authoring request. Requests
//! run with bounded parallelism (the authoring service is rate-limited),
//! results are collected as each finishes, and every successful
//! resolution is written back to the flow immediately — partial failure
//! leaves the already-resolved nodes in place, reported per node.

use std::sync::Arc;

use serde_json::to_value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use store::Store;

use crate::models::{AgentSpec, FlowSpec, FlowStatus, NodeSpec};
use crate::services::AgentAuthoring;
use crate::EngineError;

/// Worker-pool cap for concurrent authoring requests.
const DEFAULT_AUTHORING_CONCURRENCY: usize = 4;

/// Per-node result of a development pass.
#[derive(Debug)]
pub struct NodeResolution {
    pub node_id: String,
    /// Set when the node was resolved to a newly persisted agent.
    pub agent_id: Option<Uuid>,
    pub error: Option<String>,
}

/// Aggregate result of a development pass.
#[derive(Debug, Default)]
pub struct DevelopmentReport {
    pub resolved: usize,
    pub failed: usize,
    pub nodes: Vec<NodeResolution>,
}

pub struct FlowDeveloper {
    store: Arc<dyn Store>,
    authoring: Arc<dyn AgentAuthoring>,
    max_concurrency: usize,
}

impl FlowDeveloper {
    pub fn new(store: Arc<dyn Store>, authoring: Arc<dyn AgentAuthoring>) -> Self {
        Self {
            store,
            authoring,
            max_concurrency: DEFAULT_AUTHORING_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Resolve every unresolved agent node of `flow_id`.
    ///
    /// # Errors
    /// Store or definition failures on the flow itself. Authoring
    /// failures never error the pass — they land in the report.
    pub async fn develop(&self, flow_id: Uuid) -> Result<DevelopmentReport, EngineError> {
        let row = self.store.get_flow(flow_id).await?;
        let mut flow = FlowSpec::from_row(&row)?;

        let pending: Vec<NodeSpec> = flow.unresolved_agent_nodes().cloned().collect();
        if pending.is_empty() {
            if flow.status != FlowStatus::Developed {
                flow.status = FlowStatus::Developed;
                self.store
                    .update_flow(flow_id, flow.to_definition()?)
                    .await?;
            }
            return Ok(DevelopmentReport::default());
        }

        info!(
            flow_id = %flow_id,
            count = pending.len(),
            workers = self.max_concurrency,
            "resolving agent nodes"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks: JoinSet<(String, Result<AgentSpec, String>)> = JoinSet::new();

        for node in pending {
            let authoring = Arc::clone(&self.authoring);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let node_id = node.id.clone();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (node_id, Err("authoring pool closed".to_string())),
                };
                let result = authoring.author(&node).await.map_err(|e| e.to_string());
                (node_id, result)
            });
        }

        let mut report = DevelopmentReport::default();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((node_id, Ok(agent))) => {
                    match self.persist_resolution(flow_id, &mut flow, &node_id, &agent).await {
                        Ok(agent_id) => {
                            info!(node_id = %node_id, agent_id = %agent_id, "agent node resolved");
                            report.resolved += 1;
                            report.nodes.push(NodeResolution {
                                node_id,
                                agent_id: Some(agent_id),
                                error: None,
                            });
                        }
                        Err(e) => {
                            warn!(node_id = %node_id, error = %e, "failed to persist resolution");
                            report.failed += 1;
                            report.nodes.push(NodeResolution {
                                node_id,
                                agent_id: None,
                                error: Some(e.to_string()),
                            });
                        }
                    }
                }
                Ok((node_id, Err(message))) => {
                    warn!(node_id = %node_id, error = %message, "agent authoring failed");
                    report.failed += 1;
                    report.nodes.push(NodeResolution {
                        node_id,
                        agent_id: None,
                        error: Some(message),
                    });
                }
                Err(join_error) => {
                    warn!(error = %join_error, "authoring task aborted");
                    report.failed += 1;
                    report.nodes.push(NodeResolution {
                        node_id: String::new(),
                        agent_id: None,
                        error: Some(join_error.to_string()),
                    });
                }
            }
        }

        if report.failed == 0 {
            flow.status = FlowStatus::Developed;
            self.store
                .update_flow(flow_id, flow.to_definition()?)
                .await?;
        }

        info!(
            flow_id = %flow_id,
            resolved = report.resolved,
            failed = report.failed,
            "development pass finished"
        );
        Ok(report)
    }

    /// Persist one resolved agent and write its ref back into the flow.
    /// Called per completion so a later failure cannot roll it back.
    async fn persist_resolution(
        &self,
        flow_id: Uuid,
        flow: &mut FlowSpec,
        node_id: &str,
        agent: &AgentSpec,
    ) -> Result<Uuid, EngineError> {
        let agent_row = self
            .store
            .create_agent(&agent.name, to_value(agent)?)
            .await?;

        for node in flow.nodes.iter_mut() {
            if node.id == node_id {
                node.agent_ref = Some(agent_row.id);
            }
        }
        self.store
            .update_flow(flow_id, flow.to_definition()?)
            .await?;

        Ok(agent_row.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, NodeKind};
    use crate::services::ServiceError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use store::MemoryStore;

    /// Authoring stub: succeeds for every node except ids listed in
    /// `fail_ids`; tracks the peak number of in-flight requests.
    struct StubAuthoring {
        fail_ids: Vec<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StubAuthoring {
        fn new(fail_ids: &[&str]) -> Self {
            Self {
                fail_ids: fail_ids.iter().map(|s| s.to_string()).collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AgentAuthoring for StubAuthoring {
        async fn author(&self, node: &NodeSpec) -> Result<AgentSpec, ServiceError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_ids.contains(&node.id) {
                return Err(ServiceError::MalformedReply("refused".into()));
            }
            Ok(AgentSpec {
                name: node.name.clone(),
                description: None,
                nodes: vec![],
                function: format!("{{ \"{}\": [] }}", node.name),
            })
        }
    }

    fn agent_node(id: &str) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            kind: NodeKind::Agent,
            name: format!("{id}_agent"),
            parameters: Default::default(),
            code: None,
            agent_ref: None,
            flow_ref: None,
        }
    }

    async fn seed_flow(store: &MemoryStore, flow: &FlowSpec) -> Uuid {
        let definition: Value = serde_json::to_value(flow).unwrap();
        store.seed_flow(flow.id, &flow.name, definition).await;
        flow.id
    }

    #[tokio::test]
    async fn resolves_every_unresolved_node_and_marks_developed() {
        let store = Arc::new(MemoryStore::new());
        let flow = FlowSpec::new(
            "dev",
            vec![agent_node("a"), agent_node("b"), agent_node("c")],
            vec![Edge::new("a", "b"), Edge::new("b", "c")],
        );
        let flow_id = seed_flow(&store, &flow).await;

        let developer = FlowDeveloper::new(store.clone(), Arc::new(StubAuthoring::new(&[])));
        let report = developer.develop(flow_id).await.unwrap();

        assert_eq!(report.resolved, 3);
        assert_eq!(report.failed, 0);

        let row = store.get_flow(flow_id).await.unwrap();
        let developed = FlowSpec::from_row(&row).unwrap();
        assert_eq!(developed.status, FlowStatus::Developed);
        assert!(developed.unresolved_agent_nodes().next().is_none());

        // Every resolved ref points at a stored agent document.
        for node in &developed.nodes {
            let agent_id = node.agent_ref.expect("resolved");
            store.get_agent(agent_id).await.expect("agent persisted");
        }
    }

    #[tokio::test]
    async fn partial_failure_is_reported_per_node_and_not_rolled_back() {
        let store = Arc::new(MemoryStore::new());
        let flow = FlowSpec::new(
            "partial",
            vec![agent_node("ok_1"), agent_node("bad"), agent_node("ok_2")],
            vec![],
        );
        let flow_id = seed_flow(&store, &flow).await;

        let developer = FlowDeveloper::new(store.clone(), Arc::new(StubAuthoring::new(&["bad"])));
        let report = developer.develop(flow_id).await.unwrap();

        assert_eq!(report.resolved, 2);
        assert_eq!(report.failed, 1);
        let failed = report.nodes.iter().find(|n| n.node_id == "bad").unwrap();
        assert!(failed.error.is_some());

        let developed = FlowSpec::from_row(&store.get_flow(flow_id).await.unwrap()).unwrap();
        // The successes stayed resolved; the flow is not yet developed.
        assert_eq!(developed.status, FlowStatus::Draft);
        assert_eq!(developed.unresolved_agent_nodes().count(), 1);
        assert!(developed.node("ok_1").unwrap().agent_ref.is_some());
        assert!(developed.node("ok_2").unwrap().agent_ref.is_some());
    }

    #[tokio::test]
    async fn authoring_requests_respect_the_concurrency_cap() {
        let store = Arc::new(MemoryStore::new());
        let nodes: Vec<NodeSpec> = (0..8).map(|i| agent_node(&format!("n{i}"))).collect();
        let flow = FlowSpec::new("wide", nodes, vec![]);
        let flow_id = seed_flow(&store, &flow).await;

        let authoring = Arc::new(StubAuthoring::new(&[]));
        let developer =
            FlowDeveloper::new(store, authoring.clone()).with_concurrency(2);
        let report = developer.develop(flow_id).await.unwrap();

        assert_eq!(report.resolved, 8);
        assert!(authoring.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn a_fully_resolved_flow_is_just_stamped_developed() {
        let store = Arc::new(MemoryStore::new());
        let mut node = agent_node("a");
        node.agent_ref = Some(Uuid::new_v4());
        let flow = FlowSpec::new("done", vec![node], vec![]);
        let flow_id = seed_flow(&store, &flow).await;

        let developer = FlowDeveloper::new(store.clone(), Arc::new(StubAuthoring::new(&[])));
        let report = developer.develop(flow_id).await.unwrap();

        assert_eq!(report.resolved, 0);
        assert_eq!(report.failed, 0);
        let developed = FlowSpec::from_row(&store.get_flow(flow_id).await.unwrap()).unwrap();
        assert_eq!(developed.status, FlowStatus::Developed);
    }
}
