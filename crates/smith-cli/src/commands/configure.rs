use std::sync::Arc;

use anyhow::Result;
use cliclack::spinner;
use console::style;
use futures::StreamExt;
use smith::agent::{Agent, SYSTEM_AUTHOR};
use smith::config::DEFAULT_MODEL;
use smith::providers::configs::{OpenAiProviderConfig, ProviderConfig};
use smith::providers::openai::OpenAiProvider;

use crate::profile::{find_existing_profile, profile_path, save_profile, Profile};

pub async fn handle_configure(provided_profile_name: Option<String>) -> Result<()> {
    cliclack::intro(style(" configure-smith ").on_cyan().black())?;

    let profile_name = if let Some(name) = provided_profile_name {
        name
    } else {
        cliclack::input("Which profile should we configure?")
            .default_input("default")
            .interact()?
    };

    let path = profile_path()?;
    let existing_profile = find_existing_profile(&path, &profile_name);
    if existing_profile.is_some() {
        let _ = cliclack::log::info(format!(
            "We are updating the existing profile for {}",
            profile_name
        ));
    }
    let mut profile = existing_profile.unwrap_or_default();

    if std::env::var("OPENAI_API_KEY").is_err() {
        let _ = cliclack::log::warning(
            "OPENAI_API_KEY is not set. It must be set in your environment to chat.",
        );
    }

    profile.agent.name = cliclack::input("What should the agent be called?")
        .default_input(&profile.agent.name)
        .interact()?;
    profile.agent.system_message = cliclack::input("System message:")
        .default_input(&profile.agent.system_message)
        .interact()?;
    let default_model = if profile.agent.model.is_empty() {
        DEFAULT_MODEL.to_string()
    } else {
        profile.agent.model.clone()
    };
    profile.agent.model = cliclack::input("Enter a model:")
        .default_input(&default_model)
        .interact()?;
    profile.agent.auto_summarize_buffer_tokens =
        if cliclack::confirm("Summarize long conversations automatically?")
            .initial_value(profile.agent.auto_summarize_buffer_tokens.is_some())
            .interact()?
        {
            Some(
                profile
                    .agent
                    .auto_summarize_buffer_tokens
                    .unwrap_or(smith::config::DEFAULT_SUMMARIZE_BUFFER_TOKENS),
            )
        } else {
            None
        };
    profile.show_function_calls = cliclack::confirm("Show function calls by default?")
        .initial_value(profile.show_function_calls)
        .interact()?;

    if !profile.agent.apis.is_empty() {
        let _ = cliclack::log::info(format!(
            "We kept the {} APIs from your {} profile. Edit {} to change them.",
            profile.agent.apis.len(),
            profile_name,
            path.display()
        ));
    }

    // Confirm everything is configured correctly by calling the model
    let spin = spinner();
    spin.start("Checking your configuration...");
    let greeting = match check_connection(&profile).await {
        Ok(greeting) => greeting,
        Err(e) => {
            spin.stop("We could not connect!");
            let _ = cliclack::outro(format!(
                "Try rerunning configure and check your credentials: {}",
                e
            ));
            return Ok(());
        }
    };
    spin.stop(greeting);

    match save_profile(&path, &profile_name, profile) {
        Ok(()) => cliclack::outro(format!("Profile saved to: {}", path.display()))?,
        Err(e) => cliclack::outro(format!("Failed to save profile: {}", e))?,
    }
    Ok(())
}

async fn check_connection(profile: &Profile) -> Result<String> {
    let mut config = OpenAiProviderConfig::from_env()?;
    config.model = profile.agent.model.clone();
    let provider = OpenAiProvider::new(config)?;

    let mut agent_config = profile.agent.clone();
    agent_config.apis.clear();
    let mut agent = Agent::from_config(&agent_config, Arc::new(provider));

    let mut messages = agent.start_conversation(
        "Please give a nice welcome message (one sentence) and let them know they are all set to use this agent",
        "User",
    );
    let mut reply = None;
    while let Some(message) = messages.next().await {
        if message.author.as_deref() == Some(SYSTEM_AUTHOR) {
            anyhow::bail!(message.content.unwrap_or_default());
        }
        if !message.is_function_call && message.author.as_deref() != Some("User") {
            reply = message.content;
        }
    }
    Ok(reply.unwrap_or_else(|| "No response text available".to_string()))
}
