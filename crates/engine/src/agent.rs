//! The agent runtime — assembles an agent's fragments into one callable.
//!
//! Loading gives each agent a fresh registry (no leakage between agents
//! or runs sharing a process), materializes every node body plus the
//! orchestrating entry function, and binds node parameters so sibling
//! calls observe the bound form. The entry symbol must carry the agent's
//! own name — that contract comes from the authoring pipeline.

use dsl::{DslError, Registry};
use serde_json::Value;
use tracing::debug;

use crate::models::AgentSpec;
use crate::EngineError;

/// A loaded agent: one registry and its entry function.
pub struct AgentHandle {
    name: String,
    registry: Registry,
}

impl AgentHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the agent's orchestrating function with `input`.
    pub fn invoke(&self, input: Value) -> Result<Value, DslError> {
        self.registry.invoke(&self.name, input)
    }
}

/// Load an agent spec into a callable handle.
///
/// All fragments materialize or the agent is unusable — a single
/// failure aborts the load and the partially-filled registry is
/// discarded with it.
///
/// # Errors
/// - [`EngineError::Dsl`] if any fragment fails to materialize.
/// - [`EngineError::EntryPointNotFound`] if the entry fragment does not
///   define a function named after the agent.
pub fn load_agent(spec: &AgentSpec) -> Result<AgentHandle, EngineError> {
    let mut registry = Registry::new();

    for node in &spec.nodes {
        if let Some(code) = &node.code {
            registry.materialize(code, &node.name)?;
        }
    }

    // The orchestrator goes in last; it assumes its siblings are already
    // registered.
    registry.materialize(&spec.function, &spec.name)?;

    for node in &spec.nodes {
        if node.code.is_some() {
            registry.bind(&node.name, node.parameters.clone());
        }
    }

    if !registry.contains(&spec.name) {
        return Err(EngineError::EntryPointNotFound {
            agent: spec.name.clone(),
        });
    }

    debug!(agent = %spec.name, nodes = spec.nodes.len(), "agent loaded");
    Ok(AgentHandle {
        name: spec.name.clone(),
        registry,
    })
}
