use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub const OPENAI_DEFAULT_HOST: &str = "https://api.openai.com";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-3.5-turbo-0613";

pub trait ProviderConfig {
    fn from_env() -> Result<Self>
    where
        Self: Sized;

    /// Read `key` from the environment. A missing required key is an error,
    /// a missing optional key yields `default`.
    fn get_env(key: &str, required: bool, default: Option<String>) -> Result<Option<String>> {
        match env::var(key) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) if !required => Ok(default),
            Err(env::VarError::NotPresent) => Err(anyhow!(
                "Environment variable '{}' is required but not set.",
                key
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl OpenAiProviderConfig {
    pub fn new(host: String, api_key: String, model: String) -> Self {
        Self {
            host,
            api_key,
            model,
            temperature: Some(0.0),
            max_tokens: None,
        }
    }
}

impl ProviderConfig for OpenAiProviderConfig {
    fn from_env() -> Result<Self> {
        let api_key = Self::get_env("OPENAI_API_KEY", true, None)?
            .ok_or_else(|| anyhow!("OpenAI API key should be present"))?;
        let host = Self::get_env("OPENAI_HOST", false, None)?
            .unwrap_or_else(|| OPENAI_DEFAULT_HOST.to_string());
        let model = Self::get_env("OPENAI_MODEL", false, None)?
            .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());

        Ok(Self::new(host, api_key, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("OPENAI_API_KEY", "sk-test");
        env::set_var("OPENAI_MODEL", "gpt-4");
        env::remove_var("OPENAI_HOST");

        let config = OpenAiProviderConfig::from_env().unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.host, OPENAI_DEFAULT_HOST);
        assert_eq!(config.temperature, Some(0.0));

        env::remove_var("OPENAI_API_KEY");
        env::remove_var("OPENAI_MODEL");
    }

    #[test]
    #[serial]
    fn test_from_env_requires_key() {
        env::remove_var("OPENAI_API_KEY");
        let error = OpenAiProviderConfig::from_env().unwrap_err();
        assert!(error.to_string().contains("OPENAI_API_KEY"));
    }
}
