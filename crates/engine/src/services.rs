//! External service contracts: the semantic oracle and the agent
//! authoring call.
//!
//! Both are backed by out-of-process AI services; the engine only owns
//! the request/response shape. Failures never abort a run at the call
//! site — the router downgrades oracle errors to "condition is false"
//! and the developer records authoring errors per node.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::models::{AgentSpec, NodeSpec};

/// Errors from an external service call.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

// ---------------------------------------------------------------------------
// Semantic oracle
// ---------------------------------------------------------------------------

/// Fallback boolean evaluator for conditions the deterministic grammar
/// cannot parse: `{condition, output} -> bool`.
#[async_trait]
pub trait SemanticOracle: Send + Sync {
    async fn evaluate(&self, condition: &str, output: &Value) -> Result<bool, ServiceError>;
}

/// Oracle client posting to an inference-service endpoint. Accepts a
/// bare JSON boolean or `{"result": <bool>}` as the verdict.
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOracle {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl SemanticOracle for HttpOracle {
    async fn evaluate(&self, condition: &str, output: &Value) -> Result<bool, ServiceError> {
        let reply: Value = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "condition": condition, "output": output }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        reply
            .as_bool()
            .or_else(|| reply.get("result").and_then(Value::as_bool))
            .ok_or_else(|| ServiceError::MalformedReply(reply.to_string()))
    }
}

/// Oracle used when no inference service is configured: every
/// natural-language condition evaluates to `false`, so only
/// deterministic edges match.
pub struct OfflineOracle;

#[async_trait]
impl SemanticOracle for OfflineOracle {
    async fn evaluate(&self, condition: &str, _output: &Value) -> Result<bool, ServiceError> {
        debug!(condition, "no oracle configured; condition does not match");
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Agent authoring
// ---------------------------------------------------------------------------

/// The flow-developer authoring call: `{nodeDescription} -> AgentSpec`.
#[async_trait]
pub trait AgentAuthoring: Send + Sync {
    async fn author(&self, node: &NodeSpec) -> Result<AgentSpec, ServiceError>;
}

/// Authoring client posting the node description to an authoring-service
/// endpoint that replies with a full agent document.
pub struct HttpAuthoring {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuthoring {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AgentAuthoring for HttpAuthoring {
    async fn author(&self, node: &NodeSpec) -> Result<AgentSpec, ServiceError> {
        let reply: Value = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "node": node }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        serde_json::from_value(reply).map_err(|e| ServiceError::MalformedReply(e.to_string()))
    }
}
