use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod functions;
mod profile;
mod prompt;
mod session;

use commands::configure::handle_configure;
use commands::session::build_session;
use profile::PROFILE_DEFAULT_NAME;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Profile to chat with
    #[arg(short, long, default_value = PROFILE_DEFAULT_NAME)]
    profile: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create or update a profile interactively
    Configure {
        /// Name of the profile to configure
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Start an interactive chat (the default)
    Session,

    /// Send one message and print the reply
    Run {
        /// The message to send
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logs go to stderr and stay quiet so they do not break up the chat
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Configure { profile }) => handle_configure(profile).await,
        Some(Command::Run { text }) => {
            let mut session = build_session(&cli.profile).await?;
            session.headless_start(&text).await
        }
        Some(Command::Session) | None => {
            let mut session = build_session(&cli.profile).await?;
            session.start().await
        }
    }
}
