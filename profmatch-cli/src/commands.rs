//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use futures::StreamExt;
use profmatch_core::config::{ServiceConfig, load_config, user_config_path};
use profmatch_core::gateway::{GatewayServer, run_gateway};
use profmatch_core::{
    ChatCompletionHandler, Conversation, ConversationMessage, HttpProviderFactory, ModelSettings,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, config_file: Option<&Path>) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => handle_serve(config_file, host, port).await,
        Commands::Ask { question } => handle_ask(config_file, &question.join(" ")).await,
        Commands::Config { action } => handle_config(action, config_file),
    }
}

fn load(config_file: Option<&Path>) -> anyhow::Result<ServiceConfig> {
    let config = load_config(config_file, None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    for warning in config.validate() {
        warn!("{}", warning);
    }
    Ok(config)
}

fn build_handler(config: &ServiceConfig) -> ChatCompletionHandler {
    let factory = HttpProviderFactory::new(config.clone());
    ChatCompletionHandler::new(Arc::new(factory), ModelSettings::from(&config.openai))
}

async fn handle_serve(
    config_file: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = load(config_file)?;

    // Apply CLI overrides
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let handler = build_handler(&config);
    let gateway = Arc::new(GatewayServer::new(config.server.clone(), handler));

    tokio::select! {
        result = run_gateway(gateway) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}

async fn handle_ask(config_file: Option<&Path>, question: &str) -> anyhow::Result<()> {
    let config = load(config_file)?;
    let handler = build_handler(&config);
    let conversation = Conversation::new(vec![ConversationMessage::user(question)])?;

    let mut tokens = handler
        .handle(&conversation)
        .await
        .map_err(|e| anyhow::anyhow!("{}: {}", e.public_message(), e))?;

    let mut stdout = tokio::io::stdout();
    while let Some(fragment) = tokens.next().await {
        let fragment = fragment.map_err(|e| anyhow::anyhow!("Answer interrupted: {}", e))?;
        stdout.write_all(&fragment).await?;
        stdout.flush().await?;
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

fn handle_config(action: ConfigAction, config_file: Option<&Path>) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { path } => {
            let config_path = path
                .or_else(user_config_path)
                .ok_or_else(|| anyhow::anyhow!("No config directory on this platform; pass --path"))?;
            let created = write_default_config(&config_path)?;
            if created {
                println!(
                    "Created default configuration at: {}",
                    config_path.display()
                );
            } else {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(config_file)?;
            println!("{}", render_config(&config)?);
            Ok(())
        }
    }
}

/// Write the default configuration unless the file already exists.
fn write_default_config(config_path: &Path) -> anyhow::Result<bool> {
    if config_path.exists() {
        return Ok(false);
    }
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(config_path, render_config(&ServiceConfig::default())?)?;
    Ok(true)
}

fn render_config(config: &ServiceConfig) -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(&config.redacted())?)
}
