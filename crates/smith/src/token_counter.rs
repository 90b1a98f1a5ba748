use std::path::Path;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tokenizers::tokenizer::Tokenizer;
use tracing::warn;

use crate::models::function::FunctionDescriptor;

/// Environment variable naming a `tokenizer.json` used for counting
pub const TOKENIZER_ENV: &str = "SMITH_TOKENIZER";

const TOKENS_PER_MESSAGE: usize = 3;
const TOKENS_PER_NAME: usize = 1;
const REPLY_PRIMING_TOKENS: usize = 3;
const CHARS_PER_TOKEN: usize = 4;

/// The context window of a model, in tokens
pub fn context_size(model: &str) -> usize {
    let model = model.to_lowercase();
    if model.contains("gpt-4") && model.contains("32k") {
        32768
    } else if model.contains("gpt-4o") || model.contains("gpt-4-turbo") {
        128000
    } else if model.contains("gpt-4") {
        8192
    } else if model.contains("gpt-3.5") && model.contains("16k") {
        16384
    } else {
        4096
    }
}

/// Counts prompt tokens for history and catalog budgeting.
///
/// Uses a real tokenizer when one is loaded and a characters-per-token
/// estimate otherwise, so counting never fails.
#[derive(Clone, Default)]
pub struct TokenCounter {
    tokenizer: Option<Tokenizer>,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("tokenizer", &self.tokenizer.is_some())
            .finish()
    }
}

impl TokenCounter {
    /// Loads the tokenizer named by `SMITH_TOKENIZER`, if any
    pub fn new() -> Self {
        match std::env::var(TOKENIZER_ENV) {
            Ok(path) => Self::from_file(&path).unwrap_or_else(|e| {
                warn!(path, error = %e, "Falling back to estimated token counts");
                Self::estimating()
            }),
            Err(_) => Self::estimating(),
        }
    }

    pub fn estimating() -> Self {
        Self { tokenizer: None }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path.as_ref()).map_err(|e| {
            anyhow!(
                "Failed to load tokenizer {}: {}",
                path.as_ref().display(),
                e
            )
        })?;
        Ok(Self {
            tokenizer: Some(tokenizer),
        })
    }

    pub fn has_tokenizer(&self) -> bool {
        self.tokenizer.is_some()
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        if let Some(tokenizer) = &self.tokenizer {
            match tokenizer.encode(text, false) {
                Ok(encoding) => return encoding.len(),
                Err(e) => warn!(error = %e, "Tokenizer failed, estimating instead"),
            }
        }
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }

    /// Tokens used by a list of wire-format chat messages
    pub fn count_chat_tokens(&self, messages: &[Value]) -> usize {
        let mut total = 0;
        for message in messages {
            total += TOKENS_PER_MESSAGE;
            let Some(fields) = message.as_object() else {
                continue;
            };
            for (key, value) in fields {
                total += match value {
                    Value::String(text) => self.count_tokens(text),
                    Value::Null => 0,
                    Value::Object(call) => call
                        .values()
                        .map(|v| match v {
                            Value::String(text) => self.count_tokens(text),
                            other => self.count_tokens(&other.to_string()),
                        })
                        .sum(),
                    other => self.count_tokens(&other.to_string()),
                };
                if key == "name" {
                    total += TOKENS_PER_NAME;
                }
            }
        }
        total + REPLY_PRIMING_TOKENS
    }

    /// Local estimate of what a function catalog costs in the prompt
    pub fn count_function_tokens(&self, functions: &[FunctionDescriptor]) -> usize {
        functions
            .iter()
            .map(|function| {
                serde_json::to_string(function)
                    .map(|text| self.count_tokens(&text))
                    .unwrap_or(0)
            })
            .sum()
    }
}
