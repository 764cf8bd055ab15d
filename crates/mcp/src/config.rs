//! Launch configuration for a tool server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Separator between a server name and a tool name in qualified tool names.
pub const NAMESPACE_SEPARATOR: char = '_';

/// Configuration for an MCP server.
///
/// The process is launched as `command [script] args...` with `env` merged on
/// top of the inherited environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub script: Option<PathBuf>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub description: String,
    pub enabled: bool,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            script: None,
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            description: String::new(),
            enabled: true,
        }
    }

    pub fn script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Check the parts of the configuration that can be checked statically.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Configuration("server name is empty".into()));
        }
        if self.name.contains(NAMESPACE_SEPARATOR) {
            return Err(Error::Configuration(format!(
                "server name '{}' must not contain '{NAMESPACE_SEPARATOR}'",
                self.name
            )));
        }
        if self.command.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "server '{}' has no command",
                self.name
            )));
        }
        Ok(())
    }

    /// Make sure the script (or, without one, a path-like command) exists.
    ///
    /// Bare command names are resolved through `PATH` at spawn time and are
    /// not checked here.
    pub fn check_launch_path(&self) -> Result<()> {
        let path = match &self.script {
            Some(script) => self.resolve(script),
            None if self.command.contains(std::path::MAIN_SEPARATOR) => {
                self.resolve(Path::new(&self.command))
            }
            None => return Ok(()),
        };
        if path.exists() {
            Ok(())
        } else {
            Err(Error::NotFound(path))
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Qualified name of one of this server's tools.
    pub fn qualify(&self, tool: &str) -> String {
        format!("{}{NAMESPACE_SEPARATOR}{tool}", self.name)
    }
}
