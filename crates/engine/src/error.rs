//! Engine-level error types.
//!
//! Only pre-start conditions surface as `EngineError` from a run; once a
//! RunRecord exists, node-level failures are recorded in the ledger and
//! the run finishes `failed` instead of erroring.

use thiserror::Error;

/// Errors produced by the flow engine (validation + execution setup).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// A flow with zero nodes is invalid.
    #[error("flow has no nodes")]
    EmptyFlow,

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge (or the entry point) references a node ID that doesn't
    /// exist in the flow.
    #[error("'{node_id}' referenced by {side} is not a node in this flow")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// No entry node could be resolved.
    #[error("no entry point found in flow")]
    NoEntryPoint,

    // ------ Execution-setup errors ------

    /// An agent node has no agent attached yet; the flow must be
    /// developed before it can run.
    #[error("agent node '{node_id}' is unresolved; develop the flow first")]
    UnresolvedAgentNode { node_id: String },

    /// The orchestrating fragment does not define the symbol named after
    /// the agent — a naming-contract violation in the authored spec.
    #[error("agent '{agent}' does not define entry function '{agent}'")]
    EntryPointNotFound { agent: String },

    /// Nested flows recursed past the configured limit.
    #[error("nested flows exceed the depth limit of {0}")]
    DepthExceeded(u32),

    // ------ Wrapped lower layers ------

    /// A fragment failed to materialize or a node body raised.
    #[error(transparent)]
    Dsl(#[from] dsl::DslError),

    /// A stored definition document does not deserialize into its domain
    /// type.
    #[error("invalid {kind} definition: {source}")]
    InvalidDefinition {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization of a domain document failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Persistence error from the store crate.
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),
}
