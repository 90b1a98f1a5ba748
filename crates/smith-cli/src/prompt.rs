use anyhow::Result;
use smith::models::message::Message;

pub mod rustyline;

/// A terminal front end for the agent's message stream
pub trait Prompt {
    /// Draw one emitted message. Function traffic is only drawn when `show_function_calls` is set.
    fn render(&mut self, message: &Message, show_function_calls: bool);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&self);
    fn close(&mut self);
    fn smith_ready(&self, agent_name: &str) {
        println!(
            "\n{} is ready! Type a message, or \"exit\" to end the session.\n",
            agent_name
        );
    }
}

pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>,
}

impl Input {
    pub fn message(text: String) -> Self {
        Input {
            input_type: InputType::Message,
            content: Some(text),
        }
    }

    pub fn control(input_type: InputType) -> Self {
        Input {
            input_type,
            content: None,
        }
    }
}

pub enum InputType {
    /// Nothing to send, prompt again
    AskAgain,
    Message,
    Exit,
}

/// Syntax highlighting palette for rendered markdown
pub enum Theme {
    Light,
    Dark,
}
