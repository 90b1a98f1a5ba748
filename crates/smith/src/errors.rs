use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Function execution failed: {0}")]
    ExecutionError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Token budget exhausted: {0}")]
    TokenBudgetExhausted(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl From<crate::schema::SchemaError> for AgentError {
    fn from(err: crate::schema::SchemaError) -> Self {
        AgentError::Schema(err.to_string())
    }
}

impl From<crate::openapi::RegistryError> for AgentError {
    fn from(err: crate::openapi::RegistryError) -> Self {
        AgentError::Configuration(err.to_string())
    }
}
