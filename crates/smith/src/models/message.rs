use super::role::Role;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One turn or sub-turn of a conversation.
///
/// Messages are built once by the agent and never changed afterwards; the
/// builder methods consume and return `self` so a message is complete before
/// it is appended to a [`Chat`](super::chat::Chat).
pub struct Message {
    pub role: Role,
    pub created: i64,
    /// Provenance label, e.g. the agent name, "User" or "System"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intended_recipient: Option<String>,
    #[serde(default)]
    pub is_function_call: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func_arguments: Option<Map<String, Value>>,
    /// Opaque completion status reported by the model backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            author: None,
            intended_recipient: None,
            is_function_call: false,
            content: None,
            func_name: None,
            func_arguments: None,
            finish_reason: None,
        }
    }

    /// Create a new system message with the current timestamp
    pub fn system() -> Self {
        Self::new(Role::System)
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create a new function-result message with the current timestamp
    pub fn function() -> Self {
        Self::new(Role::Function)
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = Some(text.into());
        self
    }

    pub fn with_content(mut self, content: Option<String>) -> Self {
        self.content = content;
        self
    }

    pub fn with_author<S: Into<String>>(mut self, author: S) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_recipient<S: Into<String>>(mut self, recipient: S) -> Self {
        self.intended_recipient = Some(recipient.into());
        self
    }

    /// Mark this message as a request from the model to invoke `name`
    pub fn with_function_call<S: Into<String>>(
        mut self,
        name: S,
        arguments: Map<String, Value>,
    ) -> Self {
        self.is_function_call = true;
        self.func_name = Some(name.into());
        self.func_arguments = Some(arguments);
        self
    }

    /// Record which function produced this result
    pub fn with_func_name<S: Into<String>>(mut self, name: S) -> Self {
        self.func_name = Some(name.into());
        self
    }

    pub fn with_finish_reason(mut self, finish_reason: Option<String>) -> Self {
        self.finish_reason = finish_reason;
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// A message after which the model is expected to respond: a user turn or
    /// a function result
    pub fn awaits_response(&self) -> bool {
        !self.is_function_call && matches!(self.role, Role::User | Role::Function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_function_call_builder() {
        let mut args = Map::new();
        args.insert("x".to_string(), json!("hello"));

        let message = Message::assistant()
            .with_author("Assistant")
            .with_recipient("Assistant (echo function)")
            .with_function_call("echo", args.clone());

        assert!(message.is_function_call);
        assert_eq!(message.func_name.as_deref(), Some("echo"));
        assert_eq!(message.func_arguments, Some(args));
        assert!(message.content.is_none());
        assert!(!message.awaits_response());
    }

    #[test]
    fn test_awaits_response() {
        assert!(Message::user().with_text("hi").awaits_response());
        assert!(Message::function().with_text("{}").awaits_response());
        assert!(!Message::assistant().with_text("hello").awaits_response());
        assert!(!Message::system().with_text("be nice").awaits_response());
    }

    #[test]
    fn test_serialization_skips_empty_fields() -> anyhow::Result<()> {
        let message = Message::user().with_text("Hi").with_author("User");
        let value = serde_json::to_value(&message)?;

        assert_eq!(value["role"], json!("user"));
        assert_eq!(value["content"], json!("Hi"));
        assert_eq!(value["is_function_call"], json!(false));
        assert!(value.get("func_name").is_none());
        assert!(value.get("finish_reason").is_none());

        let back: Message = serde_json::from_value(value)?;
        assert_eq!(back, message);
        Ok(())
    }
}
