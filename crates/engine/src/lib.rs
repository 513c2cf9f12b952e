//! `engine` crate — domain models, flow validation, and the flow/agent
//! execution engine.

pub mod agent;
pub mod developer;
pub mod error;
pub mod executor;
pub mod models;
pub mod router;
pub mod services;
pub mod validate;

pub use agent::{load_agent, AgentHandle};
pub use developer::{DevelopmentReport, FlowDeveloper, NodeResolution};
pub use error::EngineError;
pub use executor::{ExecutorConfig, FlowExecutor, RunOutcome};
pub use models::{AgentSpec, Edge, FlowSpec, FlowStatus, NodeKind, NodeSpec};
pub use router::EdgeRouter;
pub use services::{
    AgentAuthoring, HttpAuthoring, HttpOracle, OfflineOracle, SemanticOracle, ServiceError,
};
pub use validate::validate_flow;
