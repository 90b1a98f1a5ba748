use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::function::FunctionDescriptor;
use crate::models::message::Message;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Base trait for chat-completion backends that support function calling
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next message for the full history, offering `functions`
    /// to the model with automatic function-call selection.
    async fn complete(
        &self,
        messages: &[Message],
        functions: &[FunctionDescriptor],
    ) -> Result<(Message, Usage)>;

    /// Prompt tokens the function catalog adds to every request.
    ///
    /// Measured by completing the same short probe conversation with and
    /// without the catalog. `None` when the backend reports no usage.
    async fn function_schema_tokens(
        &self,
        functions: &[FunctionDescriptor],
    ) -> Result<Option<usize>> {
        let probe = [
            Message::system().with_text("You are a helpful assistant."),
            Message::user().with_text("hi"),
        ];
        let (_, with_functions) = self.complete(&probe, functions).await?;
        let (_, without_functions) = self.complete(&probe, &[]).await?;

        Ok(
            match (with_functions.input_tokens, without_functions.input_tokens) {
                (Some(with), Some(without)) => Some((with - without).max(0) as usize + 2),
                _ => None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_serialization() -> Result<()> {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        let serialized = serde_json::to_string(&usage)?;
        let deserialized: Usage = serde_json::from_str(&serialized)?;
        assert_eq!(usage, deserialized);

        let json_value: serde_json::Value = serde_json::from_str(&serialized)?;
        assert_eq!(json_value["input_tokens"], json!(10));
        assert_eq!(json_value["total_tokens"], json!(30));
        Ok(())
    }

    struct CountingProvider;

    #[async_trait]
    impl Provider for CountingProvider {
        async fn complete(
            &self,
            _messages: &[Message],
            functions: &[FunctionDescriptor],
        ) -> Result<(Message, Usage)> {
            let prompt = 20 + 15 * functions.len() as i32;
            Ok((
                Message::assistant().with_text("hello"),
                Usage::new(Some(prompt), Some(1), Some(prompt + 1)),
            ))
        }
    }

    #[tokio::test]
    async fn test_function_schema_tokens_probe() -> Result<()> {
        let functions = vec![
            FunctionDescriptor::new("a", "A", Default::default()),
            FunctionDescriptor::new("b", "B", Default::default()),
        ];
        let tokens = CountingProvider.function_schema_tokens(&functions).await?;
        assert_eq!(tokens, Some(32));
        Ok(())
    }
}
