use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration, set the {env_var} environment variable")]
    MissingEnvVar { env_var: String },
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a dotted configuration key.
///
/// Bare field names belong to the provider section, the only one with
/// required fields.
pub fn to_env_var(field: &str) -> String {
    let path = if field.contains('.') {
        field.to_string()
    } else {
        format!("provider.{}", field)
    };
    format!("SMITH_{}", path.replace('.', "__").to_uppercase())
}

/// Pull the dotted key out of a serde "missing field" message, which config
/// may suffix with the enclosing key
pub fn missing_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let field = rest.split('`').next()?;
    let section = message
        .split("for key `")
        .nth(1)
        .and_then(|s| s.split('`').next())
        .filter(|s| !s.is_empty());
    Some(match section {
        Some(section) => format!("{}.{}", section, field),
        None => field.to_string(),
    })
}
