use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

mod config;

use config::CliConfig;
use peerchat_session::tcp::TcpTransport;
use peerchat_session::{ConnectionSupervisor, PeerSession, SessionObserver};

#[derive(Parser)]
#[command(name = "peerchat", about = "Encrypted peer-to-peer chat over TCP")]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overrides config
    #[arg(long)]
    listen: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Wait for a peer to connect to us
    Host,
    /// Connect to a hosting peer
    Connect {
        /// The host's address, e.g. 192.168.1.10:4380
        remote: String,
    },
}

/// Prints session events to the terminal.
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_connect(&self) {
        println!("* peer authenticated, you can chat now");
    }

    fn on_disconnect(&self, reason: &str) {
        println!("* session closed: {reason}");
    }

    fn on_message(&self, text: &str, timestamp: u64) {
        println!("[{timestamp}] peer: {text}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "peerchat=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file: {}", config_path))?;
        toml::from_str::<CliConfig>(&content)?
    } else {
        CliConfig::default()
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let transport = Arc::new(TcpTransport::new(config.listen.clone()));
    let mut supervisor = ConnectionSupervisor::new(transport, config.session.clone());

    let session = match &args.command {
        Command::Host => {
            let session = supervisor.host().await?;
            let local_id = supervisor.local_id().unwrap_or("?").to_owned();
            println!("* hosting on {local_id}, waiting for a peer");
            session
        }
        Command::Connect { remote } => {
            info!(remote = %remote, "connecting");
            let session = supervisor.connect(remote).await?;
            println!("* connected to {remote}");
            session
        }
    };
    session.set_observer(Arc::new(ConsoleObserver));

    chat_loop(&session).await?;
    supervisor.destroy().await;
    Ok(())
}

/// Read lines from stdin and send them until either side ends the
/// session. `/quit` disconnects cleanly.
async fn chat_loop(session: &PeerSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            reason = session.closed() => {
                info!(reason = %reason, "session ended");
                return Ok(());
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    session.send_disconnect("user-quit").await;
                    return Ok(());
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text == "/quit" {
                    session.send_disconnect("user-quit").await;
                    return Ok(());
                }
                match session.send_message(text).await {
                    Ok(timestamp) => println!("[{timestamp}] you: {text}"),
                    Err(e) => warn!(error = %e, "message not sent"),
                }
            }
        }
    }
}
