use super::message::Message;
use super::role::Role;
use serde::{Deserialize, Serialize};

/// The persisted transcript of one agent.
///
/// The first message is always the system message. Messages are appended in
/// the order they are produced; the only other mutation is [`Chat::splice`],
/// which replaces everything after the system message in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    messages: Vec<Message>,
}

impl Chat {
    pub fn new(system: Message) -> Self {
        debug_assert_eq!(system.role, Role::System);
        Self {
            messages: vec![system],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_message(&self) -> &Message {
        &self.messages[0]
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drop everything but the system message and append `messages`
    pub fn splice(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.truncate(1);
        self.messages.extend(messages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splice_keeps_system_message() {
        let mut chat = Chat::new(Message::system().with_text("You are a helpful assistant."));
        chat.push(Message::user().with_text("one"));
        chat.push(Message::assistant().with_text("two"));
        chat.push(Message::user().with_text("three"));

        chat.splice(vec![Message::user().with_text("summary\n\nthree")]);

        assert_eq!(chat.len(), 2);
        assert_eq!(chat.system_message().role, Role::System);
        assert_eq!(chat.messages()[1].text(), Some("summary\n\nthree"));
    }
}
