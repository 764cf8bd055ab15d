//! Configuration loading from skiff.toml.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mcp::ServerConfig;
use runtime::{DEFAULT_SYSTEM_PROMPT, SessionConfig};
use serde::Deserialize;
use tracing::info;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelSection,
    pub agent: AgentSection,

    /// Fallback values for `${VAR}` placeholders.
    pub env: BTreeMap<String, String>,

    pub servers: Vec<ServerEntry>,
}

/// Chat model endpoint.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub base_url: String,
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Dispatch loop settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub system_prompt: Option<String>,
    pub max_tool_rounds: usize,
    pub bridge_timeout_secs: u64,
    pub turn_timeout_secs: u64,
    pub enable_tools: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            system_prompt: None,
            max_tool_rounds: session.max_tool_rounds,
            bridge_timeout_secs: runtime::DEFAULT_TIMEOUT.as_secs(),
            turn_timeout_secs: session.turn_timeout.as_secs(),
            enable_tools: session.tools_enabled,
        }
    }
}

/// One `[[servers]]` entry.
#[derive(Debug, Deserialize)]
pub struct ServerEntry {
    pub name: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_command")]
    pub command: String,

    /// Server script passed as the first argument to `command`.
    pub path: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub description: String,

    pub working_dir: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

fn default_command() -> String {
    "python3".to_string()
}

/// Outcome of checking every configured server without starting any.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
    pub warnings: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load `path`, or fall back to built-in defaults when it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Replace `${VAR}` placeholders from the process environment, then from
    /// the `[env]` table. Unknown placeholders are kept as written.
    pub fn expand(&self, value: &str) -> String {
        expand_vars(value, |name| {
            std::env::var(name)
                .ok()
                .or_else(|| self.env.get(name).cloned())
        })
    }

    /// Launch configuration for one entry, placeholders expanded.
    pub fn server_config(&self, entry: &ServerEntry) -> ServerConfig {
        let mut config = ServerConfig::new(&entry.name, self.expand(&entry.command))
            .args(entry.args.iter().map(|a| self.expand(a)))
            .description(&entry.description)
            .enabled(entry.enabled);
        if let Some(path) = &entry.path {
            config = config.script(self.expand(path));
        }
        if let Some(dir) = &entry.working_dir {
            config = config.working_dir(PathBuf::from(self.expand(dir)));
        }
        for (key, value) in &entry.env {
            config = config.env(key, self.expand(value));
        }
        config
    }

    pub fn server_configs(&self) -> Vec<ServerConfig> {
        self.servers.iter().map(|s| self.server_config(s)).collect()
    }

    /// Check every server entry statically.
    ///
    /// Disabled servers only produce a warning. A server is invalid when its
    /// name or command is unusable, or when its script does not exist.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        for entry in &self.servers {
            let name = &entry.name;
            if !entry.enabled {
                report.warnings.push(format!("{name}: Disabled"));
                continue;
            }

            let config = self.server_config(entry);
            if let Err(e) = config.validate() {
                report.invalid.push(name.clone());
                report.warnings.push(format!("{name}: {e}"));
                continue;
            }

            match (&config.script, config.check_launch_path()) {
                (_, Err(mcp::Error::NotFound(path))) => {
                    report.invalid.push(name.clone());
                    report
                        .warnings
                        .push(format!("{name}: Server script not found: {}", path.display()));
                }
                (_, Err(e)) => {
                    report.invalid.push(name.clone());
                    report.warnings.push(format!("{name}: {e}"));
                }
                (None, Ok(())) => {
                    report.valid.push(name.clone());
                    report.warnings.push(format!(
                        "{name}: No path configured, launching '{}' directly",
                        config.command
                    ));
                }
                (Some(_), Ok(())) => report.valid.push(name.clone()),
            }
        }
        report
    }

    /// The API key named by `model.api_key_env`, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.model.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.bridge_timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            system_prompt: self
                .agent
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tool_rounds: self.agent.max_tool_rounds,
            tools_enabled: self.agent.enable_tools,
            turn_timeout: Duration::from_secs(self.agent.turn_timeout_secs),
        }
    }
}

fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[start..start + end + 3]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
