//! profmatch CLI: serves the professor recommendation endpoint or answers a
//! single question from the terminal.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// profmatch: find professors that fit how you learn
#[derive(Parser, Debug)]
#[command(name = "profmatch", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Subcommand (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug, PartialEq)]
enum Commands {
    /// Serve the chat endpoint over HTTP
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Ask one question and stream the answer to stdout
    Ask {
        /// The question, as typed by a student
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug, PartialEq)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Destination (defaults to the user config path)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the effective configuration with secrets redacted
    Show,
}

fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(log_filter(cli.verbose, cli.quiet)));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "profmatch", "profmatch")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "profmatch.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let command = cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    });
    commands::handle_command(command, cli.config.as_deref()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_serve() {
        let cli = Cli::try_parse_from(["profmatch"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from(["profmatch", "serve", "--host", "0.0.0.0", "-p", "8080"])
            .unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Serve {
                host: Some("0.0.0.0".into()),
                port: Some(8080),
            })
        );
    }

    #[test]
    fn test_ask_joins_words() {
        let cli = Cli::try_parse_from(["profmatch", "-vv", "ask", "easy", "calculus?"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Commands::Ask { question }) => assert_eq!(question.join(" "), "easy calculus?"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_ask_requires_question() {
        assert!(Cli::try_parse_from(["profmatch", "ask"]).is_err());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli =
            Cli::try_parse_from(["profmatch", "config", "show", "--config", "my.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("my.toml")));
        assert_eq!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        );
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(0, true), "error");
        assert_eq!(log_filter(0, false), "info");
        assert_eq!(log_filter(1, false), "debug");
        assert_eq!(log_filter(3, true), "trace");
    }
}
