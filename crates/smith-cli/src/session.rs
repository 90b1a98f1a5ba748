use anyhow::Result;
use futures::StreamExt;
use smith::agent::Agent;
use smith::models::message::Message;

use crate::functions::{lock, SharedDisplay};
use crate::prompt::{InputType, Prompt};
use self::log::ConversationLog;

pub mod log;

pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
    display: SharedDisplay,
    log: ConversationLog,
    started: bool,
}

impl<'a> Session<'a> {
    pub fn new(
        agent: Agent,
        prompt: Box<dyn Prompt + 'a>,
        display: SharedDisplay,
        log: ConversationLog,
    ) -> Self {
        Session {
            agent,
            prompt,
            display,
            log,
            started: false,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt.smith_ready(self.agent.name());

        loop {
            let input = self.prompt.get_input()?;
            let text = match input.input_type {
                InputType::Message => match input.content {
                    Some(text) => text,
                    None => continue,
                },
                InputType::Exit => break,
                InputType::AskAgain => continue,
            };

            self.agent_process_message(&text).await;
            if lock(&self.display).exit_requested {
                break;
            }
        }
        self.close_session();
        Ok(())
    }

    /// Answer a single message and return, for scripted use
    pub async fn headless_start(&mut self, text: &str) -> Result<()> {
        self.agent_process_message(text).await;
        self.close_session();
        Ok(())
    }

    async fn agent_process_message(&mut self, text: &str) {
        self.prompt.show_busy();
        let mut busy = true;

        let mut messages = if self.started {
            self.agent.continue_conversation(text, "User")
        } else {
            self.agent.start_conversation(text, "User")
        };

        loop {
            tokio::select! {
                message = messages.next() => {
                    let Some(message) = message else { break };
                    if busy {
                        self.prompt.hide_busy();
                        busy = false;
                    }
                    show(self.prompt.as_mut(), &self.display, &self.log, &message);
                }
                _ = tokio::signal::ctrl_c() => {
                    // messages already appended to the history are kept
                    self.prompt.render(&system_notice("Interrupted."), true);
                    break;
                }
            }
        }
        drop(messages);

        if busy {
            self.prompt.hide_busy();
        }
        self.started = true;
    }

    fn close_session(&mut self) {
        println!(
            "Closing session. Conversation logged to {}",
            self.log.path().display()
        );
        self.prompt.close();
    }
}

fn show(prompt: &mut dyn Prompt, display: &SharedDisplay, log: &ConversationLog, message: &Message) {
    if let Err(e) = log.append(message) {
        tracing::warn!(error = %e, path = %log.path().display(), "Failed to log message");
    }
    // the echo of what was just typed is logged but not rendered again
    if message.author.as_deref() == Some("User") {
        return;
    }
    let show_function_calls = lock(display).show_function_calls;
    prompt.render(message, show_function_calls);
}

fn system_notice(content: &str) -> Message {
    Message::assistant()
        .with_text(content)
        .with_author("System")
        .with_recipient("User")
}
