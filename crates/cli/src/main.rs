mod config;
mod error;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mcp::Supervisor;
use runtime::{Bridge, OpenAiBackend, Session, ToolHost};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::{Config, ModelSection};
use error::{Error, Result};

#[derive(Parser)]
#[command(name = "skiff")]
#[command(about = "Chat with a model that can use MCP tool servers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "skiff.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Validate the configured servers and show their state
    Servers,
    /// Connect every enabled server and list the tools offered to the model
    Tools,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Some(Commands::Chat) | None => cmd_chat(&config).await,
        Some(Commands::Servers) => cmd_servers(&config).await,
        Some(Commands::Tools) => cmd_tools(&config).await,
    }
}

/// Register every configured server with a fresh host. Nothing is spawned.
///
/// Entries the supervisor rejects are skipped with a warning.
async fn build_host(config: &Config) -> Result<Arc<ToolHost>> {
    let supervisor = Supervisor::new();
    for server in config.server_configs() {
        let name = server.name.clone();
        if let Err(e) = supervisor.register(server).await {
            warn!(server = %name, error = %e, "skipping invalid server");
        }
    }
    let bridge = Bridge::with_timeout(config.bridge_timeout())?;
    Ok(Arc::new(ToolHost::new(supervisor, bridge)))
}

fn build_backend(config: &Config) -> Result<OpenAiBackend> {
    let model = &config.model;
    let mut builder = OpenAiBackend::builder(&model.model)
        .base_url(&model.base_url)
        .temperature(model.temperature)
        .max_tokens(model.max_tokens);

    match config.api_key() {
        Some(key) => builder = builder.api_key(key),
        None if model.base_url == ModelSection::default().base_url => {
            return Err(Error::MissingApiKey(model.api_key_env.clone()));
        }
        None => warn!(var = %model.api_key_env, "no API key set, sending requests without one"),
    }
    Ok(builder.build())
}

async fn cmd_chat(config: &Config) -> Result<()> {
    println!("skiff v{}", env!("CARGO_PKG_VERSION"));

    let backend = build_backend(config)?;
    let host = build_host(config).await?;

    for (server, connected) in host.connect_all().await {
        if !connected {
            warn!(server = %server, "server unavailable, continuing without its tools");
        }
    }

    println!("Model: {backend}");
    let mut session = Session::with_config(backend, Arc::clone(&host), config.session_config());
    println!("Session ID: {}", session.id);
    println!("Commands: /tools, /servers, /clear. Type 'quit' or Ctrl+D to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("interrupted");
                break;
            }
        };
        // EOF
        let Some(line) = line else { break };

        let input = line.trim();
        match input {
            "" => continue,
            "quit" | "exit" => break,
            "/clear" => {
                session.clear();
                println!("History cleared.\n");
            }
            "/tools" => print_tools(&host).await,
            "/servers" => print_status(&host).await,
            _ => {
                let reply = tokio::select! {
                    reply = session.chat(input) => reply,
                    _ = tokio::signal::ctrl_c() => {
                        println!();
                        info!("interrupted");
                        break;
                    }
                };
                println!("\n{reply}\n");
            }
        }
    }

    host.shutdown().await;
    println!("\nSession ended.");
    Ok(())
}

async fn cmd_servers(config: &Config) -> Result<()> {
    let report = config.validate();
    println!("Valid servers: {}", join_or_none(&report.valid));
    println!("Invalid servers: {}", join_or_none(&report.invalid));
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    println!();

    let host = build_host(config).await?;
    print_status(&host).await;
    Ok(())
}

async fn cmd_tools(config: &Config) -> Result<()> {
    let host = build_host(config).await?;
    print_tools(&host).await;
    host.shutdown().await;
    Ok(())
}

async fn print_tools(host: &ToolHost) {
    let catalog = host.snapshot().await;
    if catalog.is_empty() {
        println!("No tools available.\n");
        return;
    }
    println!("{} tools:", catalog.len());
    for spec in catalog.specs() {
        println!("  {:<32}  {}", spec.name, first_line(&spec.description));
    }
    println!();
}

async fn print_status(host: &ToolHost) {
    let status = host.supervisor().status().await;
    if status.is_empty() {
        println!("No servers configured.\n");
        return;
    }
    println!("{:<16}  {:<8}  {:<13}  {:<6}  DESCRIPTION", "SERVER", "ENABLED", "STATE", "TOOLS");
    println!("{}", "-".repeat(72));
    for server in status {
        let tools = server
            .tool_count
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        println!(
            "{:<16}  {:<8}  {:<13}  {:<6}  {}",
            server.name, server.enabled, server.state, tools, server.description
        );
        if let Some(error) = server.last_error {
            println!("{:<16}  last error: {error}", "");
        }
    }
    println!();
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_server_does_not_block_the_rest() {
        let config = Config::parse(
            r#"
[[servers]]
name = "bad_name"
command = "sh"

[[servers]]
name = "good"
command = "sh"
"#,
        )
        .unwrap();

        let host = build_host(&config).await.unwrap();
        assert_eq!(host.supervisor().names().await, ["good"]);

        let status = host.supervisor().status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].name, "good");
    }
}
