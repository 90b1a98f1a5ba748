use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use bat::WrappingMode;
use cliclack::spinner;
use console::style;
use rustyline::DefaultEditor;
use serde_json::Value;
use smith::models::message::Message;
use smith::models::role::Role;

use super::{Input, InputType, Prompt, Theme};

const PROMPT: &str = "\x1b[1m\x1b[38;5;30mUser: \x1b[0m";
const MAX_STRING_LENGTH: usize = 40;
const INDENT: &str = "    ";

pub struct RustylinePrompt {
    spinner: cliclack::ProgressBar,
    theme: Theme,
    editor: DefaultEditor,
    history_file: Option<PathBuf>,
}

impl RustylinePrompt {
    /// A prompt that keeps line history in `history_file`, if given
    pub fn new(history_file: Option<PathBuf>) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;
        if let Some(path) = &history_file {
            // a missing history file is normal on first run
            let _ = editor.load_history(path);
        }
        Ok(RustylinePrompt {
            spinner: spinner(),
            theme: Theme::Dark,
            editor,
            history_file,
        })
    }

    fn theme_name(&self) -> &'static str {
        match self.theme {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }
}

fn print_markdown(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

/// `author -> recipient` header in the colour of the role
fn print_header(message: &Message) {
    let title = format!(
        "{} -> {}",
        message.author.as_deref().unwrap_or("unknown"),
        message.intended_recipient.as_deref().unwrap_or("unknown")
    );
    let title = match message.role {
        Role::User => style(title).cyan(),
        Role::System => style(title).red(),
        Role::Assistant => style(title).blue(),
        Role::Function => style(title).dim(),
    };
    println!();
    println!("─── {} ──────────────────────────", title);
}

/// Wrap JSON content in a pretty-printed code block
fn as_markdown(content: &str) -> String {
    match serde_json::from_str::<Value>(content) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => format!(
            "```json\n{}\n```",
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| content.to_string())
        ),
        _ => content.to_string(),
    }
}

/// Format and print parameters recursively with proper indentation and colors
fn print_params(value: &Value, depth: usize) {
    let indent = INDENT.repeat(depth);

    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Object(_) | Value::Array(_) => {
                        println!("{}{}:", indent, style(key).dim());
                        print_params(val, depth + 1);
                    }
                    Value::String(s) if s.len() > MAX_STRING_LENGTH => {
                        println!("{}{}: {}", indent, style(key).dim(), style("...").dim());
                    }
                    Value::String(s) => {
                        println!("{}{}: {}", indent, style(key).dim(), style(s).green());
                    }
                    other => {
                        println!("{}{}: {}", indent, style(key).dim(), style(other).blue());
                    }
                }
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                println!("{}{}.", indent, i + 1);
                print_params(item, depth + 1);
            }
        }
        other => println!("{}{}", indent, style(other).yellow()),
    }
}

impl Prompt for RustylinePrompt {
    fn render(&mut self, message: &Message, show_function_calls: bool) {
        let theme = self.theme_name();

        match message.role {
            Role::Function if !show_function_calls => return,
            Role::Function => {
                print_header(message);
                print_markdown(&as_markdown(message.text().unwrap_or_default()), theme);
            }
            _ => {
                if let Some(text) = message.text() {
                    print_header(message);
                    print_markdown(&as_markdown(text), theme);
                }
                if message.is_function_call && show_function_calls {
                    print_header(message);
                    println!(
                        "{}",
                        style(message.func_name.as_deref().unwrap_or("unknown")).magenta()
                    );
                    if let Some(arguments) = &message.func_arguments {
                        print_params(&Value::Object(arguments.clone()), 1);
                    }
                }
            }
        }

        println!();
        let _ = io::stdout().flush();
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("thinking...");
    }

    fn hide_busy(&self) {
        self.spinner.stop("");
    }

    fn get_input(&mut self) -> Result<Input> {
        let input = self.editor.readline(PROMPT);
        let message_text = match input {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                match e {
                    rustyline::error::ReadlineError::Interrupted => (),
                    rustyline::error::ReadlineError::Eof => (),
                    _ => eprintln!("Input error: {}", e),
                }
                return Ok(Input::control(InputType::Exit));
            }
        };
        if !message_text.is_empty() {
            let _ = self.editor.add_history_entry(message_text.as_str());
        }

        if message_text.is_empty() {
            Ok(Input::control(InputType::AskAgain))
        } else if message_text.eq_ignore_ascii_case("exit") || message_text.eq_ignore_ascii_case("/exit")
        {
            Ok(Input::control(InputType::Exit))
        } else if message_text.eq_ignore_ascii_case("/t") {
            self.theme = match self.theme {
                Theme::Light => {
                    println!("Switching to Dark theme");
                    Theme::Dark
                }
                Theme::Dark => {
                    println!("Switching to Light theme");
                    Theme::Light
                }
            };
            Ok(Input::control(InputType::AskAgain))
        } else if message_text.eq_ignore_ascii_case("/?")
            || message_text.eq_ignore_ascii_case("/help")
        {
            println!("Commands:");
            println!("exit | /exit - Exit the session");
            println!("/t - Toggle Light/Dark theme");
            println!("/? | /help - Display this help message");
            println!("Ask the agent to show or hide function calls to see what it runs.");
            Ok(Input::control(InputType::AskAgain))
        } else {
            Ok(Input::message(message_text))
        }
    }

    fn close(&mut self) {
        if let Some(path) = &self.history_file {
            if let Err(e) = self.editor.save_history(path) {
                tracing::warn!(error = %e, "Could not save prompt history");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_content_becomes_code_block() {
        let rendered = as_markdown("{\"a\":1}");
        assert!(rendered.starts_with("```json\n"));
        assert!(rendered.contains("\"a\": 1"));
    }

    #[test]
    fn test_plain_content_is_untouched() {
        assert_eq!(as_markdown("Hello there"), "Hello there");
        // scalars are valid JSON but read better as-is
        assert_eq!(as_markdown("\"10/19/26 12:00\""), "\"10/19/26 12:00\"");
    }
}
