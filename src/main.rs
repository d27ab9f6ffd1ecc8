use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parley_gateway::agent::{ReplyMode, TurnRequest};
use parley_gateway::call::{ContactDirectory, resolve_identity};
use parley_gateway::db::CallRepo;
use parley_gateway::{Config, Daemon};

/// Parley - Voice call and chat gateway for an AI receptionist
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, env = "PARLEY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(long, env = "PARLEY_PORT", global = true)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default)
    Serve,
    /// Send one chat message through the agent and print the reply
    Chat {
        /// Message text
        message: String,
        /// Resolve identity as if this number were calling
        #[arg(long)]
        phone: Option<String>,
    },
    /// Print a stored call transcript
    Transcript {
        /// Carrier call ID
        call_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley_gateway=info",
        1 => "info,parley_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(server = ?config.server, providers = ?config.llm.providers, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(port = config.server.port, "starting parley gateway");
            Daemon::new(config)?.run().await?;
        }
        Command::Chat { message, phone } => chat(config, &message, phone.as_deref()).await?,
        Command::Transcript { call_id } => transcript(config, &call_id)?,
    }

    Ok(())
}

/// One chat turn from the terminal, without session history
async fn chat(config: Config, message: &str, phone: Option<&str>) -> anyhow::Result<()> {
    let message = message.trim();
    anyhow::ensure!(!message.is_empty(), "message is required");

    let directory = ContactDirectory::from_config(&config.owner, &config.contacts);
    let daemon = Daemon::new(config)?;
    let pipeline = daemon.pipeline();
    if pipeline.cascade().is_empty() {
        tracing::warn!("no completion providers configured");
    }

    let memory = pipeline.memory();
    let identity = resolve_identity(&directory, memory.as_ref(), phone).await;
    let reply = pipeline
        .respond(TurnRequest {
            utterance: message,
            history: &[],
            identity: &identity,
            touchpoints: None,
            mode: ReplyMode::Chat,
        })
        .await;

    println!("{}", reply.text);
    tracing::debug!(
        intent = reply.intent.as_str(),
        provider = reply.provider.as_deref().unwrap_or("none"),
        "chat reply"
    );
    Ok(())
}

/// Print a stored transcript
fn transcript(config: Config, call_id: &str) -> anyhow::Result<()> {
    let daemon = Daemon::new(config)?;
    let repo = CallRepo::new(daemon.pool().clone());

    let Some(transcript) = repo.get_transcript(call_id)? else {
        anyhow::bail!("no transcript for call {call_id}");
    };

    println!("{}", transcript.render());
    Ok(())
}
