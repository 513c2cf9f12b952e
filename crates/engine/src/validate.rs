//! Flow validation — run this before persisting or executing a flow.
//!
//! Rules enforced:
//! 1. The flow has at least one node.
//! 2. Node IDs are unique within the flow.
//! 3. Every edge references valid node IDs (both `source` and `target`).
//! 4. An explicit `entry_point` names an existing node.
//!
//! Unlike a DAG pipeline, this graph may cycle — routing loops are
//! bounded at run time by the executor's step limit — so there is no
//! topological check here.

use std::collections::HashSet;

use crate::models::FlowSpec;
use crate::EngineError;

/// Validate a flow's structure.
///
/// # Errors
/// - [`EngineError::EmptyFlow`] for a flow with no nodes.
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if an edge or the entry point
///   references a missing node.
pub fn validate_flow(flow: &FlowSpec) -> Result<(), EngineError> {
    if flow.nodes.is_empty() {
        return Err(EngineError::EmptyFlow);
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &flow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    for edge in &flow.edges {
        if !seen_ids.contains(edge.source.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.source.clone(),
                side: "edge source",
            });
        }
        if !seen_ids.contains(edge.target.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.target.clone(),
                side: "edge target",
            });
        }
    }

    if let Some(entry) = &flow.entry_point {
        if !seen_ids.contains(entry.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: entry.clone(),
                side: "entry_point",
            });
        }
    }

    Ok(())
}

/// Resolve the node execution starts from: the explicit `entry_point`
/// wins, else the first node with no incoming edge, else the first node.
pub fn resolve_entry(flow: &FlowSpec) -> Option<&str> {
    if let Some(entry) = &flow.entry_point {
        return Some(entry.as_str());
    }

    let targets: HashSet<&str> = flow.edges.iter().map(|e| e.target.as_str()).collect();
    flow.nodes
        .iter()
        .find(|n| !targets.contains(n.id.as_str()))
        .or_else(|| flow.nodes.first())
        .map(|n| n.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, NodeSpec};

    fn make_node(id: &str) -> NodeSpec {
        NodeSpec {
            id: id.to_string(),
            kind: Default::default(),
            name: id.to_uppercase(),
            parameters: Default::default(),
            code: None,
            agent_ref: None,
            flow_ref: None,
        }
    }

    #[test]
    fn valid_linear_flow_passes() {
        let flow = FlowSpec::new(
            "linear",
            vec![make_node("a"), make_node("b")],
            vec![Edge::new("a", "b")],
        );
        validate_flow(&flow).expect("should be valid");
    }

    #[test]
    fn empty_flow_is_rejected() {
        let flow = FlowSpec::new("empty", vec![], vec![]);
        assert!(matches!(validate_flow(&flow), Err(EngineError::EmptyFlow)));
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let flow = FlowSpec::new("dup", vec![make_node("a"), make_node("a")], vec![]);
        assert!(matches!(
            validate_flow(&flow),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let flow = FlowSpec::new(
            "bad",
            vec![make_node("a")],
            vec![Edge::new("a", "ghost")],
        );
        assert!(matches!(
            validate_flow(&flow),
            Err(EngineError::UnknownNodeReference { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn unknown_entry_point_is_rejected() {
        let mut flow = FlowSpec::new("bad-entry", vec![make_node("a")], vec![]);
        flow.entry_point = Some("ghost".into());
        assert!(matches!(
            validate_flow(&flow),
            Err(EngineError::UnknownNodeReference { side: "entry_point", .. })
        ));
    }

    #[test]
    fn cycles_are_allowed() {
        let flow = FlowSpec::new(
            "cyclic",
            vec![make_node("a"), make_node("b")],
            vec![Edge::new("a", "b"), Edge::new("b", "a")],
        );
        validate_flow(&flow).expect("cycles are bounded at run time");
    }

    #[test]
    fn explicit_entry_point_wins() {
        let mut flow = FlowSpec::new(
            "entry",
            vec![make_node("start"), make_node("override")],
            vec![Edge::new("start", "override")],
        );
        // `start` has no incoming edge, but the explicit entry wins.
        flow.entry_point = Some("override".into());
        assert_eq!(resolve_entry(&flow), Some("override"));
    }

    #[test]
    fn zero_incoming_edge_node_is_the_fallback_entry() {
        let flow = FlowSpec::new(
            "fallback",
            vec![make_node("b"), make_node("a")],
            vec![Edge::new("a", "b")],
        );
        assert_eq!(resolve_entry(&flow), Some("a"));
    }

    #[test]
    fn first_node_is_the_last_resort_entry() {
        let flow = FlowSpec::new(
            "ring",
            vec![make_node("x"), make_node("y")],
            vec![Edge::new("x", "y"), Edge::new("y", "x")],
        );
        assert_eq!(resolve_entry(&flow), Some("x"));
    }
}
