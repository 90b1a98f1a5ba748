use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};

use crate::models::function::FunctionDescriptor;
use crate::models::message::Message;
use crate::models::role::Role;

/// Convert internal messages to the OpenAI chat-completions message list.
///
/// Function-call arguments travel as a JSON-encoded string on the wire.
/// A function result without a name (an unresolved call) borrows the name of
/// the call it answers, as the API requires one.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut spec = Vec::with_capacity(messages.len());
    let mut last_call: Option<&str> = None;

    for message in messages {
        let converted = if message.is_function_call {
            let name = message.func_name.as_deref().unwrap_or_default();
            last_call = Some(name);
            let arguments = message
                .func_arguments
                .as_ref()
                .map(|args| Value::Object(args.clone()))
                .unwrap_or_else(|| json!({}));
            json!({
                "role": message.role.as_str(),
                "content": message.content,
                "function_call": {
                    "name": name,
                    "arguments": arguments.to_string(),
                }
            })
        } else if message.role == Role::Function {
            let name = message
                .func_name
                .as_deref()
                .or(last_call)
                .unwrap_or("unknown");
            json!({
                "role": message.role.as_str(),
                "name": name,
                "content": message.content,
            })
        } else {
            json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        };
        spec.push(converted);
    }

    spec
}

/// Convert function descriptors to the legacy `functions` request field
pub fn functions_to_openai_spec(functions: &[FunctionDescriptor]) -> Result<Vec<Value>> {
    let mut function_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for function in functions {
        if !function_names.insert(&function.name) {
            return Err(anyhow!("Duplicate function name: {}", function.name));
        }
        result.push(serde_json::to_value(function)?);
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: Value) -> Result<Message> {
    let choice = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .ok_or_else(|| anyhow!("No choices in response: {}", response))?;
    let original = &choice["message"];
    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(String::from);
    let content = original
        .get("content")
        .and_then(Value::as_str)
        .map(String::from);

    let message = Message::assistant()
        .with_content(content)
        .with_finish_reason(finish_reason);

    let Some(call) = original.get("function_call").filter(|c| !c.is_null()) else {
        return Ok(message);
    };

    let name = call
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Function call without a name: {}", call))?;
    let arguments = match call.get("arguments") {
        Some(Value::String(raw)) if raw.trim().is_empty() => Map::new(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(arguments)) => arguments,
            Ok(other) => {
                return Err(anyhow!(
                    "Arguments for function {} are not an object: {}",
                    name,
                    other
                ))
            }
            Err(e) => {
                return Err(anyhow!(
                    "Could not interpret arguments for function {}: {}",
                    name,
                    e
                ))
            }
        },
        Some(Value::Object(arguments)) => arguments.clone(),
        _ => Map::new(),
    };

    Ok(message.with_function_call(name, arguments))
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::function::ParameterSchema;

    const OPENAI_FUNCTION_CALL_RESPONSE: &str = r#"{
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "function_call": {
                    "name": "echo",
                    "arguments": "{\"x\": \"hello\"}"
                }
            },
            "finish_reason": "function_call"
        }],
        "usage": {
            "prompt_tokens": 10,
            "completion_tokens": 25,
            "total_tokens": 35
        }
    }"#;

    fn echo_call() -> Message {
        let mut arguments = Map::new();
        arguments.insert("x".to_string(), json!("hello"));
        Message::assistant().with_function_call("echo", arguments)
    }

    #[test]
    fn test_messages_to_openai_spec() {
        let messages = vec![
            Message::system().with_text("You are a helpful assistant."),
            Message::user().with_text("please echo hello"),
            echo_call(),
            Message::function().with_func_name("echo").with_text("\"hello\""),
        ];
        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 4);
        assert_eq!(spec[0], json!({"role": "system", "content": "You are a helpful assistant."}));
        assert_eq!(spec[1], json!({"role": "user", "content": "please echo hello"}));
        assert_eq!(spec[2]["content"], Value::Null);
        assert_eq!(spec[2]["function_call"]["name"], "echo");
        let arguments: Value =
            serde_json::from_str(spec[2]["function_call"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(arguments, json!({"x": "hello"}));
        assert_eq!(
            spec[3],
            json!({"role": "function", "name": "echo", "content": "\"hello\""})
        );
    }

    #[test]
    fn test_unnamed_function_result_borrows_call_name() {
        let messages = vec![
            echo_call(),
            Message::function().with_text("Error: function echo not found."),
        ];
        let spec = messages_to_openai_spec(&messages);
        assert_eq!(spec[1]["name"], "echo");
    }

    #[test]
    fn test_functions_to_openai_spec() -> Result<()> {
        let mut properties = Map::new();
        properties.insert("x".to_string(), json!({"type": "string", "description": "Text"}));
        let function = FunctionDescriptor::new(
            "echo",
            "Echo the input",
            ParameterSchema::new(properties, vec!["x".to_string()]),
        );

        let spec = functions_to_openai_spec(&[function.clone()])?;
        assert_eq!(
            spec[0],
            json!({
                "name": "echo",
                "description": "Echo the input",
                "parameters": {
                    "type": "object",
                    "properties": {"x": {"type": "string", "description": "Text"}},
                    "required": ["x"]
                }
            })
        );

        let duplicate = functions_to_openai_spec(&[function.clone(), function]);
        assert!(duplicate
            .unwrap_err()
            .to_string()
            .contains("Duplicate function name"));
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_text() -> Result<()> {
        let response = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Hello from John Cena!"},
                "finish_reason": "stop"
            }]
        });
        let message = openai_response_to_message(response)?;
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.text(), Some("Hello from John Cena!"));
        assert_eq!(message.finish_reason.as_deref(), Some("stop"));
        assert!(!message.is_function_call);
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_function_call() -> Result<()> {
        let response: Value = serde_json::from_str(OPENAI_FUNCTION_CALL_RESPONSE)?;
        let message = openai_response_to_message(response)?;
        assert!(message.is_function_call);
        assert_eq!(message.func_name.as_deref(), Some("echo"));
        assert_eq!(
            message.func_arguments.unwrap().get("x"),
            Some(&json!("hello"))
        );
        assert_eq!(message.finish_reason.as_deref(), Some("function_call"));
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_invalid_arguments() -> Result<()> {
        let mut response: Value = serde_json::from_str(OPENAI_FUNCTION_CALL_RESPONSE)?;
        response["choices"][0]["message"]["function_call"]["arguments"] = json!("{\"x\": ");
        let error = openai_response_to_message(response).unwrap_err();
        assert!(error.to_string().contains("Could not interpret arguments"));
        Ok(())
    }

    #[test]
    fn test_check_openai_context_length_error() {
        let error = json!({
            "code": "context_length_exceeded",
            "message": "This message is too long"
        });
        let result = check_openai_context_length_error(&error);
        assert!(result.is_some());
        assert_eq!(
            result.unwrap().to_string(),
            "Context length exceeded. Message: This message is too long"
        );

        let error = json!({"code": "other_error", "message": "Some other error"});
        assert!(check_openai_context_length_error(&error).is_none());
    }
}
