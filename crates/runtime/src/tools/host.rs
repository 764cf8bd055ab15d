//! Tool host: the merged local + MCP tool catalog and call routing.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use mcp::{NAMESPACE_SEPARATOR, Supervisor};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Catalog, LocalTool, LocalTools, Route, ToolEnvelope, ToolError, ToolResult, ToolSpec};
use crate::bridge::Bridge;
use crate::model::ToolCall;

/// Default bound on catalog discovery, which may connect servers.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns local tools, the MCP [`Supervisor`] and the [`Bridge`] every tool
/// call runs through.
///
/// One host is built per process and shared (behind `Arc`) by the sessions
/// and front ends that need tools.
pub struct ToolHost {
    supervisor: Arc<Supervisor>,
    local: LocalTools,
    bridge: Bridge,
    discovery_timeout: Duration,
}

impl ToolHost {
    pub fn new(supervisor: Supervisor, bridge: Bridge) -> Self {
        Self {
            supervisor: Arc::new(supervisor),
            local: LocalTools::default(),
            bridge,
            discovery_timeout: DISCOVERY_TIMEOUT,
        }
    }

    /// Add a local tool.
    pub fn with_tool(mut self, tool: impl LocalTool + 'static) -> Self {
        self.local.register(Arc::new(tool));
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn local_names(&self) -> Vec<String> {
        self.local.names()
    }

    /// Build the catalog for one turn.
    ///
    /// Local tools come first, followed by the tools of every enabled server
    /// as `{server}_{tool}`. Servers that cannot be reached contribute
    /// nothing. A remote name that equals a local tool name is left out,
    /// since the local tool would take every call to it anyway.
    pub async fn snapshot(&self) -> Catalog {
        let mut catalog = Catalog::default();
        for spec in self.local.specs() {
            let route = Route::Local(spec.name.clone());
            catalog.insert(spec, route);
        }

        let supervisor = Arc::clone(&self.supervisor);
        let discovery = self
            .bridge
            .execute_with_timeout(
                async move {
                    let servers = supervisor.enabled_names().await;
                    let tools = join_all(servers.iter().map(|s| supervisor.list_server_tools(s))).await;
                    servers.into_iter().zip(tools).collect::<Vec<_>>()
                },
                self.discovery_timeout,
            )
            .await;

        let remote = match discovery {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "remote tools unavailable this turn");
                Vec::new()
            }
        };

        for (server, tools) in remote {
            for tool in tools {
                let name = format!("{server}{NAMESPACE_SEPARATOR}{}", tool.name);
                if self.local.contains(&name) {
                    warn!(tool = %name, "remote tool shadowed by local tool");
                    continue;
                }
                catalog.insert(
                    ToolSpec::new(name, tool.description, tool.input_schema),
                    Route::Remote {
                        server: server.clone(),
                        tool: tool.name,
                    },
                );
            }
        }

        debug!(tools = catalog.len(), "built tool catalog");
        catalog
    }

    /// [`snapshot`](Self::snapshot) for callers without a runtime.
    pub fn snapshot_blocking(self: &Arc<Self>) -> Catalog {
        let host = Arc::clone(self);
        self.bridge
            .execute_blocking_with_timeout(async move { host.snapshot().await }, self.discovery_timeout)
            .unwrap_or_else(|e| {
                warn!(error = %e, "tool catalog unavailable");
                Catalog::default()
            })
    }

    /// Decide where a tool name runs.
    ///
    /// An exact local name wins. Otherwise the catalog's route is used, and
    /// names outside the catalog are split at the first separator and sent
    /// to that server if it is registered and enabled.
    pub async fn route(&self, name: &str, catalog: Option<&Catalog>) -> Result<Route, ToolError> {
        if self.local.contains(name) {
            return Ok(Route::Local(name.to_string()));
        }
        if let Some(route) = catalog.and_then(|c| c.route(name)) {
            return Ok(route.clone());
        }
        if let Some((server, tool)) = name.split_once(NAMESPACE_SEPARATOR) {
            if !tool.is_empty() && self.supervisor.is_enabled(server).await {
                return Ok(Route::Remote {
                    server: server.to_string(),
                    tool: tool.to_string(),
                });
            }
        }
        Err(ToolError::NotFound(name.to_string()))
    }

    /// Execute one tool call. Failures become error envelopes.
    ///
    /// Calls to the same server are exchanged one at a time, and time spent
    /// waiting for an earlier call to that server counts against the
    /// bridge timeout of the waiting call.
    pub async fn execute(&self, call: &ToolCall, catalog: Option<&Catalog>) -> ToolResult {
        let outcome = match &call.invalid_arguments {
            Some(reason) => Err(ToolError::InvalidInput(format!("{}: {reason}", call.name))),
            None => match self.route(&call.name, catalog).await {
                Ok(Route::Local(name)) => self.call_local(&name, call).await,
                Ok(Route::Remote { server, tool }) => self.call_remote(server, tool, call).await,
                Err(e) => Err(e),
            },
        };

        match &outcome {
            Ok(_) => debug!(tool = %call.name, call_id = %call.id, "tool call succeeded"),
            Err(e) => warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed"),
        }

        ToolResult {
            call_id: call.id.clone(),
            envelope: ToolEnvelope::from(outcome),
        }
    }

    /// [`execute`](Self::execute) for callers without a runtime.
    pub fn execute_blocking(self: &Arc<Self>, call: &ToolCall) -> ToolResult {
        let host = Arc::clone(self);
        let owned = call.clone();
        let budget = self.bridge.timeout() + Duration::from_secs(1);
        self.bridge
            .execute_blocking_with_timeout(async move { host.execute(&owned, None).await }, budget)
            .unwrap_or_else(|e| ToolResult {
                call_id: call.id.clone(),
                envelope: ToolEnvelope::err(&ToolError::from(e)),
            })
    }

    async fn call_local(&self, name: &str, call: &ToolCall) -> Result<Value, ToolError> {
        let tool = self
            .local
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let arguments = call.arguments.clone();
        self.bridge
            .execute(async move { tool.call(arguments).await })
            .await?
    }

    async fn call_remote(&self, server: String, tool: String, call: &ToolCall) -> Result<Value, ToolError> {
        let supervisor = Arc::clone(&self.supervisor);
        let arguments = Value::Object(call.arguments.clone());
        let text = self
            .bridge
            .execute(async move { supervisor.call_tool(&server, &tool, Some(arguments)).await })
            .await??;
        Ok(Value::String(text))
    }

    /// Connect every enabled server up front. Returns each server's outcome.
    pub async fn connect_all(&self) -> Vec<(String, bool)> {
        let supervisor = Arc::clone(&self.supervisor);
        let outcome = self
            .bridge
            .execute_with_timeout(
                async move {
                    let servers = supervisor.enabled_names().await;
                    let connected = join_all(servers.iter().map(|s| supervisor.connect(s))).await;
                    servers.into_iter().zip(connected).collect::<Vec<_>>()
                },
                self.discovery_timeout,
            )
            .await;

        match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "connecting servers did not finish");
                Vec::new()
            }
        }
    }

    /// Disconnect every server. Never fails.
    pub async fn shutdown(&self) {
        let supervisor = Arc::clone(&self.supervisor);
        match self
            .bridge
            .execute_with_timeout(async move { supervisor.disconnect_all().await }, self.discovery_timeout)
            .await
        {
            Ok(()) => info!("all servers disconnected"),
            Err(e) => warn!(error = %e, "shutdown did not finish cleanly"),
        }
    }
}
