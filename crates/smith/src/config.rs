use serde::{Deserialize, Serialize};

pub const DEFAULT_AGENT_NAME: &str = "Assistant";
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-0613";
pub const DEFAULT_SUMMARIZE_BUFFER_TOKENS: usize = 3000;

/// An OpenAPI document to expose to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Prefix for every endpoint name from this document
    pub name: String,
    pub spec_url: String,
    pub base_url: String,
    /// Operation ids to expose; empty exposes all of them
    #[serde(default)]
    pub callable_endpoints: Vec<String>,
}

/// Everything needed to build an [`Agent`](crate::agent::Agent) apart from the
/// provider and local functions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub system_message: String,
    pub model: String,
    /// Tokens kept free below the context window before history is summarized.
    /// `None` disables summarization.
    pub auto_summarize_buffer_tokens: Option<usize>,
    /// Capacity of the agent's token budget; `None` is unlimited
    pub max_tokens: Option<f64>,
    /// Tokens per second returned to the budget
    pub token_refill_rate: f64,
    /// Upper bound on function calls within one turn; `None` is unbounded
    pub max_function_calls: Option<usize>,
    pub apis: Vec<ApiConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_string(),
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            auto_summarize_buffer_tokens: Some(DEFAULT_SUMMARIZE_BUFFER_TOKENS),
            max_tokens: None,
            token_refill_rate: 0.0,
            max_function_calls: None,
            apis: Vec::new(),
        }
    }
}
