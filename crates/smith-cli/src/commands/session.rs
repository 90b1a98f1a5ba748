use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use smith::agent::Agent;
use smith::providers::configs::{OpenAiProviderConfig, ProviderConfig};
use smith::providers::openai::OpenAiProvider;

use crate::functions::{display_functions, DisplayOptions, SharedDisplay};
use crate::profile::{config_dir, profile_path, resolve_profile};
use crate::prompt::rustyline::RustylinePrompt;
use crate::session::log::ConversationLog;
use crate::session::Session;

pub async fn build_session<'a>(profile_name: &str) -> Result<Session<'a>> {
    let profile = resolve_profile(&profile_path()?, profile_name)?;

    let mut provider_config = OpenAiProviderConfig::from_env()
        .context("Set OPENAI_API_KEY to chat with the agent")?;
    provider_config.model = profile.agent.model.clone();
    let provider = OpenAiProvider::new(provider_config)?;

    let mut agent = Agent::from_config(&profile.agent, Arc::new(provider));
    agent.register_apis(&profile.agent.apis).await?;
    for api in agent.endpoints().sources() {
        if let Some(error) = api.error() {
            eprintln!("Could not load API {}: {}", api.prefix, error);
        }
    }

    let display: SharedDisplay = Arc::new(Mutex::new(DisplayOptions {
        show_function_calls: profile.show_function_calls,
        exit_requested: false,
    }));
    for function in display_functions(&display)? {
        agent.register_function(function)?;
    }

    let dir = config_dir()?;
    let history_file = dir.join("history").join(format!("{}.history", profile_name));
    if let Some(parent) = history_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let prompt = RustylinePrompt::new(Some(history_file))?;
    let log = ConversationLog::for_profile(&dir, profile_name)?;

    Ok(Session::new(agent, Box::new(prompt), display, log))
}
