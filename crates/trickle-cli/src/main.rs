//! Trickle - streaming chat in the terminal

mod repl;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use trickle_core::{ChatClient, ChatConfig};

#[derive(Parser, Debug)]
#[command(name = "trickle", version, about = "Streaming chat in the terminal")]
struct Args {
    /// Model name (overrides config)
    #[arg(short, long)]
    model: Option<String>,

    /// Chat-completions endpoint (overrides config)
    #[arg(long)]
    api_url: Option<String>,

    /// Config file (default: <config_dir>/trickle/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays the conversation
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = ChatConfig::load(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(api_url) = args.api_url {
        config.api_url = api_url;
    }
    tracing::debug!("Using {:?}", config);

    let client = ChatClient::new(config);
    repl::run(&client).await
}
