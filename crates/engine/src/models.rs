//! Core domain models for flows and agents.
//!
//! These types are the source of truth for what a flow looks like in
//! memory. They serialise to/from the JSONB `definition` column the
//! store keeps (wire names match the documents the authoring pipelines
//! produce: `type` for the node kind, `function` for fragment code).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::EngineError;
use store::models::FlowRow;

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// What a node does when the executor reaches it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Dispatches to a loaded agent (`agent_ref`).
    Agent,
    /// Recurses into another flow (`flow_ref`).
    Flow,
    /// Hands the current data through unchanged.
    #[default]
    Passthrough,
}

// ---------------------------------------------------------------------------
// NodeSpec
// ---------------------------------------------------------------------------

/// One unit of work. The same shape serves flow-level nodes (kind +
/// refs) and agent-internal nodes (code + parameters), as in the
/// authored documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique identifier within its flow or agent (referenced by edges).
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    /// For agent-internal nodes this must equal the name of the function
    /// its fragment defines — sibling calls and binding go through it.
    #[serde(default)]
    pub name: String,
    /// Static configuration merged under every invocation's input.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    /// Source fragment implementing the node; absent for passthrough and
    /// flow-level nodes.
    #[serde(default, alias = "function", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Resolved agent reference for `agent` nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_ref: Option<Uuid>,
    /// Resolved flow reference for `flow` nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_ref: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed, optionally conditioned connection between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    /// Boolean or natural-language predicate; absent means always
    /// traverse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Display-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// Convenience constructor for an unconditioned edge.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: None,
            label: None,
        }
    }

    /// Convenience constructor for a conditioned edge.
    pub fn when(
        source: impl Into<String>,
        target: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: Some(condition.into()),
            label: None,
        }
    }
}

// ---------------------------------------------------------------------------
// FlowSpec
// ---------------------------------------------------------------------------

/// Authoring lifecycle of a flow document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    #[default]
    Draft,
    /// Every agent node has been resolved to a concrete agent.
    Developed,
}

/// A complete flow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSpec {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    /// Explicit entry node; when absent the first node with no incoming
    /// edge is used, then the first node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub status: FlowStatus,
}

impl FlowSpec {
    /// Convenience constructor for testing.
    pub fn new(name: impl Into<String>, nodes: Vec<NodeSpec>, edges: Vec<Edge>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            entry_point: None,
            nodes,
            edges,
            status: FlowStatus::Draft,
        }
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Agent nodes that have not been resolved to a concrete agent yet.
    pub fn unresolved_agent_nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Agent && n.agent_ref.is_none())
    }

    /// Parse a stored row; the row's primary key wins over any id inside
    /// the definition document.
    pub fn from_row(row: &FlowRow) -> Result<Self, EngineError> {
        let mut spec: FlowSpec = serde_json::from_value(row.definition.clone()).map_err(|e| {
            EngineError::InvalidDefinition {
                kind: "flow",
                source: e,
            }
        })?;
        spec.id = row.id;
        Ok(spec)
    }

    /// Serialise back into the stored document form.
    pub fn to_definition(&self) -> Result<Value, EngineError> {
        Ok(serde_json::to_value(self)?)
    }
}

// ---------------------------------------------------------------------------
// AgentSpec
// ---------------------------------------------------------------------------

/// A bundle of named node functions plus one orchestrating entry
/// function, executed as a unit. The entry fragment's top-level symbol
/// must be named after `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<NodeSpec>,
    /// The orchestrating entry fragment.
    pub function: String,
}

impl AgentSpec {
    /// Parse a stored agent definition document.
    pub fn from_definition(definition: &Value) -> Result<Self, EngineError> {
        serde_json::from_value(definition.clone()).map_err(|e| EngineError::InvalidDefinition {
            kind: "agent",
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_kind_defaults_to_passthrough() {
        let node: NodeSpec = serde_json::from_value(json!({ "id": "n1" })).unwrap();
        assert_eq!(node.kind, NodeKind::Passthrough);
        assert!(node.parameters.is_empty());
    }

    #[test]
    fn agent_internal_nodes_use_the_function_alias() {
        let node: NodeSpec = serde_json::from_value(json!({
            "id": "n1",
            "name": "summarize",
            "function": "{\"summarize\": []}",
            "parameters": { "model": "small" }
        }))
        .unwrap();
        assert_eq!(node.code.as_deref(), Some("{\"summarize\": []}"));
        assert_eq!(node.parameters["model"], "small");
    }

    #[test]
    fn flow_round_trips_through_its_definition() {
        let flow = FlowSpec::new(
            "demo",
            vec![NodeSpec {
                id: "a".into(),
                kind: NodeKind::Agent,
                name: "A".into(),
                parameters: Map::new(),
                code: None,
                agent_ref: Some(Uuid::new_v4()),
                flow_ref: None,
            }],
            vec![Edge::when("a", "a", "output.more == true")],
        );

        let value = flow.to_definition().unwrap();
        assert_eq!(value["status"], "draft");
        assert_eq!(value["nodes"][0]["type"], "agent");

        let parsed: FlowSpec = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.id, flow.id);
        assert_eq!(parsed.edges[0].condition.as_deref(), Some("output.more == true"));
    }

    #[test]
    fn row_id_wins_over_definition_id() {
        let definition = json!({
            "id": Uuid::new_v4(),
            "name": "f",
            "nodes": [ { "id": "only" } ]
        });
        let row = FlowRow {
            id: Uuid::new_v4(),
            name: "f".into(),
            definition,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let spec = FlowSpec::from_row(&row).unwrap();
        assert_eq!(spec.id, row.id);
    }
}
