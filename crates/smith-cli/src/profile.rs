use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use smith::config::AgentConfig;

pub const PROFILE_DEFAULT_NAME: &str = "default";

/// A named agent setup
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Profile {
    #[serde(flatten)]
    pub agent: AgentConfig,
    /// Whether function calls are rendered when a session starts
    #[serde(default)]
    pub show_function_calls: bool,
}

#[derive(Serialize, Deserialize, Default)]
pub struct Profiles {
    pub profile_items: HashMap<String, Profile>,
}

/// `~/.config/smith`, created on first use
pub fn config_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    let config_dir = home_dir.join(".config").join("smith");
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }
    Ok(config_dir)
}

pub fn profile_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("profiles.json"))
}

pub fn load_profiles(path: &Path) -> Result<HashMap<String, Profile>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = fs::read_to_string(path)?;
    let profiles: Profiles = serde_json::from_str(&content)
        .map_err(|e| anyhow!("Could not read profiles from {}: {}", path.display(), e))?;
    Ok(profiles.profile_items)
}

pub fn save_profile(path: &Path, name: &str, profile: Profile) -> Result<()> {
    let mut profile_items = load_profiles(path)?;
    profile_items.insert(name.to_string(), profile);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(&Profiles { profile_items })?;
    fs::write(path, content)?;
    Ok(())
}

pub fn find_existing_profile(path: &Path, name: &str) -> Option<Profile> {
    match load_profiles(path) {
        Ok(profiles) => profiles.get(name).cloned(),
        Err(_) => None,
    }
}

/// The named profile, or defaults when the default profile was never configured
pub fn resolve_profile(path: &Path, name: &str) -> Result<Profile> {
    match find_existing_profile(path, name) {
        Some(profile) => Ok(profile),
        None if name == PROFILE_DEFAULT_NAME => Ok(Profile::default()),
        None => Err(anyhow!(
            "No profile named '{}'. Create it with `smith configure --profile {}`",
            name,
            name
        )),
    }
}
