//! Tripmate CLI
//!
//! Terminal frontend for the Tripmate support chat.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tripmate::tui::App;
use tripmate::{ChatPipeline, ClientConfig, HttpTransport, MessageRole, TranscriptHandle};

/// Tripmate - support chat for the Tripmate travel planner
#[derive(Parser, Debug)]
#[command(name = "tripmate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backend base URL (overrides config.toml and TRIPMATE_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Config directory (default: $TRIPMATE_HOME or the platform config dir)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Verbose logging (plain mode only; the TUI owns the terminal)
    #[arg(short, long)]
    verbose: bool,

    /// Send one message without the TUI and print the reply
    #[arg(long)]
    once: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(ClientConfig::default_config_dir);
    let mut config = ClientConfig::load(config_dir).await;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.clone());
    }

    let include_context = config.include_context();
    let transport = HttpTransport::new(config)?;
    let pipeline = ChatPipeline::new(transport, TranscriptHandle::new(), include_context);

    match cli.once {
        Some(message) => run_once(cli.verbose, pipeline, &message).await,
        None => {
            let mut app = App::new(pipeline)?;
            app.run().await?;
            Ok(())
        }
    }
}

/// Plain mode: one send, reply printed to stdout.
async fn run_once(
    verbose: bool,
    pipeline: ChatPipeline<HttpTransport>,
    message: &str,
) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let context = serde_json::json!({
        "screen": "cli",
        "submittedAt": chrono::Utc::now().to_rfc3339(),
    });
    let outcome = pipeline.send(message, context).await;
    tracing::debug!("Send resolved: {outcome:?}");

    let reply = pipeline
        .transcript()
        .snapshot()
        .into_iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant)
        .map(|m| m.text)
        .unwrap_or_default();
    println!("{reply}");
    Ok(())
}
