//! Session configuration.
//!
//! This module loads, validates, and writes the operator-owned config so every
//! workflow reads its settings from one explicit object instead of globals.
use crate::prompt::DEFAULT_MAX_ATTEMPTS;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const CONFIG_FILE_NAME: &str = "hitshell.json";

/// Reward strings are dollars and exactly two decimal places of cents.
pub fn reward_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d*\.\d\d$").expect("reward pattern compiles"))
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub schema_version: u32,
    pub hit: HitConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub aws: AwsConfig,
    pub ad_server: AdServerConfig,
    pub marketplace: MarketplaceConfig,
    pub provisioning: ProvisioningConfig,
    pub task: TaskConfig,
    pub console: ShellConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            hit: HitConfig::default(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            aws: AwsConfig::default(),
            ad_server: AdServerConfig::default(),
            marketplace: MarketplaceConfig::default(),
            provisioning: ProvisioningConfig::default(),
            task: TaskConfig::default(),
            console: ShellConfig::default(),
        }
    }
}

/// Settings captured into every HIT at creation time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HitConfig {
    pub using_sandbox: bool,
    pub title: String,
    pub description: String,
    pub keywords: String,
    /// Minimum worker approval rate, in percent.
    pub approve_requirement: u32,
    pub us_only: bool,
    pub lifetime_hours: f64,
    pub max_assignments: u32,
    pub reward: String,
    pub duration_hours: u32,
}

impl Default for HitConfig {
    fn default() -> Self {
        Self {
            using_sandbox: true,
            title: "Psychology experiment".to_string(),
            description: "Take part in a short online experiment".to_string(),
            keywords: "psychology, experiment".to_string(),
            approve_requirement: 95,
            us_only: true,
            lifetime_hours: 24.0,
            max_assignments: 1,
            reward: "1.00".to_string(),
            duration_hours: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Command line that launches the experiment server.
    pub command: String,
    pub logfile: PathBuf,
    /// Upper bound on waiting for the server to reach a requested state.
    pub state_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22362,
            command: "experiment-server".to_string(),
            logfile: PathBuf::from("server.log"),
            state_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub database_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:///participants.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AwsConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: "us-east-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdServerConfig {
    pub location: String,
    pub contact_email: String,
}

impl Default for AdServerConfig {
    fn default() -> Self {
        Self {
            location: "https://ads.example.org".to_string(),
            contact_email: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub sandbox_endpoint: String,
    pub live_endpoint: String,
    pub timeout_secs: u64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            sandbox_endpoint: "https://sandbox.marketplace.example.org/api".to_string(),
            live_endpoint: "https://marketplace.example.org/api".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub endpoint: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://provisioning.example.org/api".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskConfig {
    pub support_ie: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShellConfig {
    pub max_prompt_attempts: usize,
    /// Participant records, relative to the project root.
    pub participants_path: PathBuf,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            max_prompt_attempts: DEFAULT_MAX_ATTEMPTS,
            participants_path: PathBuf::from("participants.json"),
        }
    }
}

/// Resolve which config file a session should use.
///
/// Order: explicit path, `./hitshell.json`, then the per-user config dir.
pub fn resolve_config_path(explicit: Option<&Path>, project_root: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let local = project_root.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(local);
    }
    let config_dir = dirs::config_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("cannot determine config directory"))?;
    let user = config_dir.join("hitshell").join("config.json");
    if user.is_file() {
        return Ok(user);
    }
    Ok(local)
}

/// Load the config, falling back to defaults when the file does not exist.
pub fn load_config(path: &Path) -> Result<ConsoleConfig> {
    let mut config = if path.is_file() {
        let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parse config JSON {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "config missing; using defaults");
        ConsoleConfig::default()
    };
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut ConsoleConfig) {
    if let Ok(value) = std::env::var("AWS_ACCESS_KEY_ID") {
        config.aws.access_key_id = value;
    }
    if let Ok(value) = std::env::var("AWS_SECRET_ACCESS_KEY") {
        config.aws.secret_access_key = value;
    }
}

/// Persist a config atomically in a stable JSON format.
pub fn write_config(path: &Path, config: &ConsoleConfig) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let text = serde_json::to_string_pretty(config).context("serialize config")?;
    let mut staged = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("stage config in {}", parent.display()))?;
    staged
        .write_all(text.as_bytes())
        .context("write staged config")?;
    staged
        .persist(path)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn validate_config(config: &ConsoleConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if !reward_pattern().is_match(&config.hit.reward) {
        return Err(anyhow!(
            "hit.reward must have format [dollars].[cents] (got {:?})",
            config.hit.reward
        ));
    }
    if config.server.port == 0 {
        return Err(anyhow!("server.port must be non-zero"));
    }
    if config.console.max_prompt_attempts == 0 {
        return Err(anyhow!("console.max_prompt_attempts must be at least 1"));
    }
    Ok(())
}

/// Problems that keep a session from running in offline mode.
pub fn offline_problems(config: &ConsoleConfig) -> Vec<String> {
    let mut problems = Vec::new();
    if !config.database.database_url.starts_with("sqlite") {
        problems.push(
            "database.database_url must use sqlite:// while in offline mode".to_string(),
        );
    }
    if config.server.host != "localhost" {
        problems.push("server.host must be localhost while in offline mode".to_string());
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&dir.path().join("absent.json")).expect("defaults");
        assert_eq!(config.schema_version, CONFIG_SCHEMA_VERSION);
        assert!(config.hit.using_sandbox);
        assert_eq!(config.console.max_prompt_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn partial_file_fills_missing_sections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, br#"{"hit":{"reward":"2.50","using_sandbox":false}}"#)
            .expect("write config");
        let config = load_config(&path).expect("load");
        assert_eq!(config.hit.reward, "2.50");
        assert!(!config.hit.using_sandbox);
        assert_eq!(config.hit.approve_requirement, 95);
        assert_eq!(config.server.port, 22362);
    }

    #[test]
    fn write_then_load_preserves_edits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = ConsoleConfig::default();
        config.database.database_url = "mysql://u:p@db:3306/exp".to_string();
        write_config(&path, &config).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.database.database_url, config.database.database_url);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = ConsoleConfig::default();
        config.hit.reward = "1.5".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = ConsoleConfig::default();
        config.schema_version = 9;
        assert!(validate_config(&config).is_err());

        let mut config = ConsoleConfig::default();
        config.console.max_prompt_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn reward_pattern_requires_two_decimals() {
        for good in ["1.50", ".25", "10.00"] {
            assert!(reward_pattern().is_match(good), "{good}");
        }
        for bad in ["1", "1.5", "1.505", "a.bc", "$1.00"] {
            assert!(!reward_pattern().is_match(bad), "{bad}");
        }
    }

    #[test]
    fn offline_mode_requires_local_settings() {
        let mut config = ConsoleConfig::default();
        assert!(offline_problems(&config).is_empty());
        config.database.database_url = "mysql://db/exp".to_string();
        config.server.host = "0.0.0.0".to_string();
        assert_eq!(offline_problems(&config).len(), 2);
    }
}
