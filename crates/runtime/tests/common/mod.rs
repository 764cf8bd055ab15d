//! Shared fixtures: a POSIX sh MCP server and a host wired to it.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mcp::{ServerConfig, Supervisor};
use runtime::{Bridge, ToolHost};

const STUB_SERVER: &str = r#"#!/bin/sh
echo "stub server starting"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"stub","version":"1.0"}}}\n' "$id"
      ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"ping","description":"Reply with pong","inputSchema":{"type":"object","properties":{}}},{"name":"echo","description":"Echo a greeting","inputSchema":{"type":"object","properties":{"text":{"type":"string"}},"required":["text"]}},{"name":"bare"}]}}\n' "$id"
      ;;
    *'"method":"tools/call"'*'"name":"ping"'*)
      printf '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info","data":"ping"}}\n'
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"pong"}]}}\n' "$id"
      ;;
    *'"method":"tools/call"'*'"name":"echo"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"echo: "},{"type":"text","text":"hello"}]}}\n' "$id"
      ;;
    *'"method":"tools/call"'*'"name":"slow"'*)
      sleep 1
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"finally"}]}}\n' "$id"
      ;;
    *'"method":"tools/call"'*'"name":"fail"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"boom"}],"isError":true}}\n' "$id"
      ;;
    *'"method":"tools/call"'*'"name":"imessage"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"iMessage is only available on macOS"}],"isError":true}}\n' "$id"
      ;;
    *'"method":"tools/call"'*'"name":"crash"'*)
      exit 3
      ;;
    *'"method":"tools/call"'*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32602,"message":"Unknown tool"}}\n' "$id"
      ;;
  esac
done
"#;

/// Configuration that launches the stub server with `sh` from `dir`.
pub fn stub_config(name: &str, dir: &Path) -> ServerConfig {
    let path = dir.join(format!("{name}_server.sh"));
    std::fs::write(&path, STUB_SERVER).expect("write stub server");
    ServerConfig::new(name, "sh").script(path).description("stub server")
}

/// A host with one stub server registered per name.
pub async fn stub_host(dir: &Path, servers: &[&str], bridge_timeout: Duration) -> Arc<ToolHost> {
    let supervisor = Supervisor::new();
    for name in servers {
        supervisor
            .register(stub_config(name, dir))
            .await
            .expect("register stub server");
    }
    let bridge = Bridge::with_timeout(bridge_timeout).expect("start bridge");
    Arc::new(ToolHost::new(supervisor, bridge))
}
