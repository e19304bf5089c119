use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::params::{IdGenerator, ParametersBuilder};

/// Optional preseed file passed with `--config`.
///
/// ```toml
/// [deployment]
/// dbhost = "es1.example.org"
/// dbport = 9200
/// dbname = "ponymail"
/// generator = "full"
///
/// [engine]
/// timeout_secs = 10
/// max_retries = 5
/// ```
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SetupFile {
    #[serde(default)]
    pub deployment: DeploymentSection,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Parameter values, keyed like the matching command-line flags.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeploymentSection {
    pub dbhost: Option<String>,
    pub dbport: Option<u16>,
    pub dbname: Option<String>,
    pub dbshards: Option<u32>,
    pub dbreplicas: Option<u32>,
    pub mailserver: Option<String>,
    pub mldom: Option<String>,
    pub wordcloud: Option<bool>,
    pub generator: Option<IdGenerator>,
}

impl DeploymentSection {
    /// Overlay these values onto `builder`.
    pub fn apply(&self, builder: ParametersBuilder) -> ParametersBuilder {
        builder
            .search_host(self.dbhost.clone())
            .search_port(self.dbport)
            .index_name(self.dbname.clone())
            .outgoing_mail_host(self.mailserver.clone())
            .accepted_reply_domains(self.mldom.clone())
            .word_cloud(self.wordcloud)
            .generator(self.generator)
            .shard_count(self.dbshards)
            .replica_count(self.dbreplicas)
    }
}

/// Connection behaviour for the search engine's admin API.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 5,
            backoff_ms: 500,
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    5
}
fn default_backoff_ms() -> u64 {
    500
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

pub fn load_config(path: &Path) -> Result<SetupFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: SetupFile =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let d = &config.deployment;
    if d.dbport == Some(0) {
        anyhow::bail!("deployment.dbport must be >= 1");
    }
    if d.dbshards == Some(0) {
        anyhow::bail!("deployment.dbshards must be >= 1");
    }
    for (key, value) in [
        ("dbhost", &d.dbhost),
        ("dbname", &d.dbname),
        ("mailserver", &d.mailserver),
        ("mldom", &d.mldom),
    ] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            anyhow::bail!("deployment.{} must not be empty", key);
        }
    }

    if config.engine.timeout_secs == 0 {
        anyhow::bail!("engine.timeout_secs must be > 0");
    }

    Ok(config)
}
