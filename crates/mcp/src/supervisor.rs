//! Lifecycle of the configured MCP servers.
//!
//! The [`Supervisor`] owns every registered [`ServerConfig`] and the live
//! [`Server`] session for it, if any. Connections are made lazily: listing
//! or calling a server's tools connects it first. A server that fails to
//! connect degrades to "no tools" rather than an error for listing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::protocol::Tool;
use crate::server::{DEFAULT_TIMEOUT, Server};

/// Connection state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No server with this name was registered.
    Unconfigured,
    Configured,
    Connecting,
    Connected,
    Disconnected,
    /// The last connection attempt failed, or the process went away.
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.pad(s)
    }
}

/// Point-in-time view of one server.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub tool_count: Option<usize>,
    pub connected_at: Option<DateTime<Utc>>,
}

struct Entry {
    config: ServerConfig,
    state: ConnectionState,
    session: Option<Arc<Server>>,
    last_error: Option<String>,
    tool_count: Option<usize>,
    connected_at: Option<DateTime<Utc>>,
    // Serializes connect/disconnect for this server.
    lifecycle: Arc<Mutex<()>>,
}

impl Entry {
    fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Configured,
            session: None,
            last_error: None,
            tool_count: None,
            connected_at: None,
            lifecycle: Arc::new(Mutex::new(())),
        }
    }

    fn live_session(&self) -> Option<Arc<Server>> {
        match self.state {
            ConnectionState::Connected => self.session.clone(),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Table {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

/// Owner of all server configurations and connections.
pub struct Supervisor {
    table: RwLock<Table>,
    request_timeout: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::default()),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-request timeout used for new connections.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Register a server.
    ///
    /// Registering the same configuration twice is a no-op. Registering a
    /// name that already exists with a different command is an error; other
    /// changes replace the stored configuration and apply on next connect.
    pub async fn register(&self, config: ServerConfig) -> Result<()> {
        config.validate()?;

        let mut table = self.table.write().await;
        if let Some(entry) = table.entries.get_mut(&config.name) {
            if entry.config == config {
                return Ok(());
            }
            if entry.config.command != config.command {
                return Err(Error::Configuration(format!(
                    "server '{}' is already registered with command '{}'",
                    config.name, entry.config.command
                )));
            }
            debug!(server = %config.name, "updated server configuration");
            entry.config = config;
            return Ok(());
        }

        info!(server = %config.name, command = %config.command, "registered server");
        table.order.push(config.name.clone());
        table.entries.insert(config.name.clone(), Entry::new(config));
        Ok(())
    }

    /// Connect a server, returning whether it is connected afterwards.
    ///
    /// Failures are logged and reported as `false`.
    pub async fn connect(&self, name: &str) -> bool {
        match self.try_connect(name).await {
            Ok(_) => true,
            Err(e) => {
                warn!(server = %name, error = %e, "failed to connect");
                false
            }
        }
    }

    /// Connect a server, returning its session.
    ///
    /// Already connected servers are returned as-is without respawning.
    pub async fn try_connect(&self, name: &str) -> Result<Arc<Server>> {
        let lifecycle = self.lifecycle_lock(name).await?;
        let _guard = lifecycle.lock().await;

        let config = {
            let mut table = self.table.write().await;
            let entry = table
                .entries
                .get_mut(name)
                .ok_or_else(|| Error::UnknownServer(name.to_string()))?;
            if let Some(session) = entry.live_session() {
                return Ok(session);
            }
            if !entry.config.enabled {
                return Err(Error::Disabled(name.to_string()));
            }
            entry.state = ConnectionState::Connecting;
            entry.config.clone()
        };

        let opened = self.open(config).await;

        let mut table = self.table.write().await;
        let entry = table.entries.get_mut(name);
        match opened {
            Ok(server) => {
                let server = Arc::new(server);
                if let Some(entry) = entry {
                    entry.state = ConnectionState::Connected;
                    entry.session = Some(Arc::clone(&server));
                    entry.last_error = None;
                    entry.connected_at = Some(Utc::now());
                }
                info!(server = %name, "connected");
                Ok(server)
            }
            Err(e) => {
                if let Some(entry) = entry {
                    entry.state = ConnectionState::Error;
                    entry.session = None;
                    entry.last_error = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn open(&self, config: ServerConfig) -> Result<Server> {
        config.check_launch_path()?;

        let server = Server::spawn(config)
            .await?
            .with_timeout(self.request_timeout);

        if let Err(e) = server.initialize().await {
            if let Err(teardown) = server.shutdown().await {
                debug!(server = %server.name(), error = %teardown, "teardown after failed handshake");
            }
            return Err(match e {
                Error::ServerExited => {
                    Error::ConnectFailed("server exited before completing the handshake".into())
                }
                Error::Timeout(_) => Error::ConnectFailed("handshake timed out".into()),
                other => other,
            });
        }

        Ok(server)
    }

    /// Disconnect a server. Does nothing if it is not connected.
    ///
    /// Errors from tearing down a process that already went away are logged
    /// and dropped.
    pub async fn disconnect(&self, name: &str) {
        let Ok(lifecycle) = self.lifecycle_lock(name).await else {
            debug!(server = %name, "disconnect of unknown server ignored");
            return;
        };
        let _guard = lifecycle.lock().await;

        let session = {
            let mut table = self.table.write().await;
            match table.entries.get_mut(name) {
                Some(entry) => {
                    let session = entry.session.take();
                    if session.is_some() {
                        entry.state = ConnectionState::Disconnected;
                        entry.connected_at = None;
                    }
                    session
                }
                None => None,
            }
        };

        let Some(session) = session else {
            debug!(server = %name, "not connected");
            return;
        };

        match session.shutdown().await {
            Ok(()) => info!(server = %name, "disconnected"),
            Err(e) => debug!(server = %name, error = %e, "error during teardown ignored"),
        }
    }

    /// Disconnect every server. Each disconnect runs independently.
    pub async fn disconnect_all(&self) {
        let names = self.names().await;
        join_all(names.iter().map(|name| self.disconnect(name))).await;
    }

    /// Tools advertised by a server, connecting it first if needed.
    ///
    /// Returns an empty list if the server cannot be reached.
    pub async fn list_server_tools(&self, name: &str) -> Vec<Tool> {
        match self.try_list_server_tools(name).await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(server = %name, error = %e, "server tools unavailable");
                Vec::new()
            }
        }
    }

    /// Like [`list_server_tools`](Self::list_server_tools) but reports the error.
    pub async fn try_list_server_tools(&self, name: &str) -> Result<Vec<Tool>> {
        let session = self.session(name).await?;
        let tools = self.observe(name, session.list_tools().await).await?;

        if let Some(entry) = self.table.write().await.entries.get_mut(name) {
            entry.tool_count = Some(tools.len());
        }
        debug!(server = %name, count = tools.len(), "listed tools");
        Ok(tools)
    }

    /// Call a tool on a server, connecting it first if needed.
    pub async fn call_tool(&self, name: &str, tool: &str, arguments: Option<Value>) -> Result<String> {
        let session = self.session(name).await?;
        debug!(server = %name, tool = %tool, "calling tool");
        self.observe(name, session.call_tool(tool, arguments).await)
            .await
    }

    /// Enable or disable a server. Disabling also disconnects it.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        {
            let mut table = self.table.write().await;
            let entry = table
                .entries
                .get_mut(name)
                .ok_or_else(|| Error::UnknownServer(name.to_string()))?;
            entry.config.enabled = enabled;
        }
        info!(server = %name, enabled, "server toggled");
        if !enabled {
            self.disconnect(name).await;
        }
        Ok(())
    }

    pub async fn is_registered(&self, name: &str) -> bool {
        self.table.read().await.entries.contains_key(name)
    }

    pub async fn is_enabled(&self, name: &str) -> bool {
        self.table
            .read()
            .await
            .entries
            .get(name)
            .is_some_and(|entry| entry.config.enabled)
    }

    pub async fn state(&self, name: &str) -> ConnectionState {
        self.table
            .read()
            .await
            .entries
            .get(name)
            .map_or(ConnectionState::Unconfigured, |entry| entry.state)
    }

    pub async fn config(&self, name: &str) -> Option<ServerConfig> {
        self.table
            .read()
            .await
            .entries
            .get(name)
            .map(|entry| entry.config.clone())
    }

    /// Registered server names, in registration order.
    pub async fn names(&self) -> Vec<String> {
        self.table.read().await.order.clone()
    }

    /// Enabled server names, in registration order.
    pub async fn enabled_names(&self) -> Vec<String> {
        let table = self.table.read().await;
        table
            .order
            .iter()
            .filter(|name| table.entries.get(*name).is_some_and(|e| e.config.enabled))
            .cloned()
            .collect()
    }

    pub async fn status(&self) -> Vec<ServerStatus> {
        let table = self.table.read().await;
        table
            .order
            .iter()
            .filter_map(|name| table.entries.get(name))
            .map(|entry| ServerStatus {
                name: entry.config.name.clone(),
                description: entry.config.description.clone(),
                enabled: entry.config.enabled,
                state: entry.state,
                last_error: entry.last_error.clone(),
                tool_count: entry.tool_count,
                connected_at: entry.connected_at,
            })
            .collect()
    }

    // --- Internal methods ---

    async fn lifecycle_lock(&self, name: &str) -> Result<Arc<Mutex<()>>> {
        self.table
            .read()
            .await
            .entries
            .get(name)
            .map(|entry| Arc::clone(&entry.lifecycle))
            .ok_or_else(|| Error::UnknownServer(name.to_string()))
    }

    /// The live session for a server, connecting if there is none.
    async fn session(&self, name: &str) -> Result<Arc<Server>> {
        let existing = {
            let table = self.table.read().await;
            let entry = table
                .entries
                .get(name)
                .ok_or_else(|| Error::UnknownServer(name.to_string()))?;
            entry.live_session()
        };
        match existing {
            Some(session) => Ok(session),
            None => self.try_connect(name).await,
        }
    }

    /// Drop the session of a server whose process went away so the next
    /// use reconnects.
    async fn observe<T>(&self, name: &str, result: Result<T>) -> Result<T> {
        if let Err(Error::ServerExited) = &result {
            let mut table = self.table.write().await;
            if let Some(entry) = table.entries.get_mut(name) {
                warn!(server = %name, "server exited; will reconnect on next use");
                entry.state = ConnectionState::Error;
                entry.session = None;
                entry.connected_at = None;
                entry.last_error = Some(Error::ServerExited.to_string());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_identical_config_is_noop() {
        let supervisor = Supervisor::new();
        let config = ServerConfig::new("alpha", "python3").script("server.py");
        supervisor.register(config.clone()).await.unwrap();
        supervisor.register(config).await.unwrap();
        assert_eq!(supervisor.names().await, vec!["alpha".to_string()]);
        assert_eq!(supervisor.state("alpha").await, ConnectionState::Configured);
    }

    #[tokio::test]
    async fn register_different_command_fails() {
        let supervisor = Supervisor::new();
        supervisor
            .register(ServerConfig::new("alpha", "python3"))
            .await
            .unwrap();
        let err = supervisor
            .register(ServerConfig::new("alpha", "node"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn register_rejects_separator() {
        let supervisor = Supervisor::new();
        let err = supervisor
            .register(ServerConfig::new("my_server", "python3"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(!supervisor.is_registered("my_server").await);
    }

    #[tokio::test]
    async fn unknown_server_is_unconfigured() {
        let supervisor = Supervisor::new();
        assert_eq!(supervisor.state("ghost").await, ConnectionState::Unconfigured);
        assert!(!supervisor.connect("ghost").await);
        assert!(supervisor.list_server_tools("ghost").await.is_empty());
    }

    #[tokio::test]
    async fn missing_script_fails_without_raising() {
        let supervisor = Supervisor::new();
        supervisor
            .register(ServerConfig::new("alpha", "python3").script("/no/such/server.py"))
            .await
            .unwrap();

        assert!(!supervisor.connect("alpha").await);
        assert_eq!(supervisor.state("alpha").await, ConnectionState::Error);

        let status = supervisor.status().await;
        assert!(status[0].last_error.as_deref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn disabled_server_does_not_connect() {
        let supervisor = Supervisor::new();
        supervisor
            .register(ServerConfig::new("alpha", "python3").enabled(false))
            .await
            .unwrap();
        assert!(!supervisor.connect("alpha").await);
        assert_eq!(supervisor.state("alpha").await, ConnectionState::Configured);
        assert!(supervisor.enabled_names().await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_never_connected_is_noop() {
        let supervisor = Supervisor::new();
        supervisor
            .register(ServerConfig::new("alpha", "python3"))
            .await
            .unwrap();
        supervisor.disconnect("alpha").await;
        supervisor.disconnect("alpha").await;
        supervisor.disconnect("ghost").await;
        supervisor.disconnect_all().await;
        assert_eq!(supervisor.state("alpha").await, ConnectionState::Configured);
    }

    #[tokio::test]
    async fn set_enabled_toggles() {
        let supervisor = Supervisor::new();
        supervisor
            .register(ServerConfig::new("alpha", "python3"))
            .await
            .unwrap();
        supervisor.set_enabled("alpha", false).await.unwrap();
        assert!(!supervisor.is_enabled("alpha").await);
        supervisor.set_enabled("alpha", true).await.unwrap();
        assert!(supervisor.is_enabled("alpha").await);
        assert!(supervisor.set_enabled("ghost", true).await.is_err());
    }
}
