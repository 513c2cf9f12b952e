//! The edge router — picks the next node after a node's output lands.
//!
//! Outgoing edges are considered in declared order and the first whose
//! condition holds wins; there is no priority field. Conditions that fit
//! the restricted grammar are evaluated deterministically; anything else
//! is a natural-language predicate and goes to the semantic oracle. A
//! malformed authored condition must never crash a run, so every failure
//! on this path collapses to "does not match".

use std::sync::Arc;

use dsl::expr;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::Edge;
use crate::services::SemanticOracle;

pub struct EdgeRouter {
    oracle: Arc<dyn SemanticOracle>,
}

impl EdgeRouter {
    pub fn new(oracle: Arc<dyn SemanticOracle>) -> Self {
        Self { oracle }
    }

    /// Return the target of the first outgoing edge of `from` whose
    /// condition holds against `output`, or `None` — which is normal
    /// termination, not an error.
    pub async fn route(&self, edges: &[Edge], from: &str, output: &Value) -> Option<String> {
        for edge in edges.iter().filter(|e| e.source == from) {
            if self.condition_holds(edge.condition.as_deref(), output).await {
                return Some(edge.target.clone());
            }
        }
        debug!(node_id = %from, "no outgoing edge matched");
        None
    }

    async fn condition_holds(&self, condition: Option<&str>, output: &Value) -> bool {
        let text = match condition {
            Some(text) if !text.trim().is_empty() => text,
            // Empty condition always passes.
            _ => return true,
        };

        match expr::parse(text) {
            Ok(parsed) => match expr::evaluate(&parsed, output) {
                Ok(verdict) => verdict,
                Err(e) => {
                    debug!(condition = text, error = %e, "condition does not evaluate; no match");
                    false
                }
            },
            Err(_) => match self.oracle.evaluate(text, output).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(condition = text, error = %e, "semantic oracle failed; no match");
                    false
                }
            },
        }
    }
}
