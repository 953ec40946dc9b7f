//! Entry point for `udp-endpoint`.
//!
//! Parses CLI arguments and dispatches into either **listen** or **send** mode.
//! All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, signal handling, argument parsing).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use udp_endpoint::{Endpoint, EndpointConfig, Envelope, SendMode};

/// Acknowledged, deduplicated messaging over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    tuning: Tuning,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Print every message received until interrupted.
    Listen {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
    },
    /// Send one message to a peer.
    Send {
        /// Local address to bind; port 0 picks an ephemeral port.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// Remote endpoint address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        peer: SocketAddr,
        #[arg(short, long, value_enum, default_value_t = ModeArg::Ack)]
        mode: ModeArg,
        /// Register with the peer first and ask it to acknowledge everything.
        #[arg(long)]
        register: bool,
        message: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Fire,
    Burst,
    /// Acknowledged; the monitor resends in the background.
    Ack,
    /// Acknowledged; wait for the ACK or the fail timeout.
    AckBlocking,
}

impl From<ModeArg> for SendMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Fire => SendMode::FireAndForget,
            ModeArg::Burst => SendMode::Burst,
            ModeArg::Ack => SendMode::AckNonBlocking,
            ModeArg::AckBlocking => SendMode::AckBlocking,
        }
    }
}

#[derive(Args)]
struct Tuning {
    /// Resend an unacknowledged message after this many milliseconds.
    #[arg(long, global = true, default_value_t = 3_000)]
    resend_ms: u64,
    /// Give up on an unacknowledged message after this many milliseconds.
    #[arg(long, global = true, default_value_t = 9_000)]
    fail_ms: u64,
    #[arg(long, global = true, default_value_t = 200)]
    monitor_ms: u64,
    /// Copies written per send.
    #[arg(long, global = true, default_value_t = 1)]
    burst: u32,
    #[arg(long, global = true, default_value_t = 10)]
    burst_interval_ms: u64,
    /// Number of message ids remembered for duplicate suppression.
    #[arg(long, global = true, default_value_t = 1_000)]
    history: usize,
    /// Acknowledge duplicates again, recovering from lost ACKs.
    #[arg(long, global = true)]
    ack_duplicates: bool,
}

impl Tuning {
    fn into_config(self) -> EndpointConfig {
        EndpointConfig::default()
            .with_timeouts(
                Duration::from_millis(self.resend_ms),
                Duration::from_millis(self.fail_ms),
            )
            .with_monitor_interval(Duration::from_millis(self.monitor_ms))
            .with_burst(self.burst, Duration::from_millis(self.burst_interval_ms))
            .with_history_len(self.history)
            .with_ack_duplicates(self.ack_duplicates)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.tuning.into_config();

    match cli.mode {
        Mode::Listen { bind } => listen(bind, config).await,
        Mode::Send {
            bind,
            peer,
            mode,
            register,
            message,
        } => send(bind, peer, mode.into(), register, message, config).await,
    }
}

async fn listen(bind: SocketAddr, config: EndpointConfig) -> Result<()> {
    let endpoint = Endpoint::bind(bind, config)
        .await
        .with_context(|| format!("could not listen on {bind}"))?;
    endpoint.register_receive_handler(|envelope, from| {
        println!(
            "{from} {}: {}",
            envelope.kind(),
            String::from_utf8_lossy(envelope.payload())
        );
    });

    tokio::signal::ctrl_c().await?;
    endpoint.shutdown();
    log::info!("final stats: {:?}", endpoint.stats());
    Ok(())
}

async fn send(
    bind: SocketAddr,
    peer: SocketAddr,
    mode: SendMode,
    register: bool,
    message: String,
    config: EndpointConfig,
) -> Result<()> {
    let endpoint = Endpoint::bind(bind, config)
        .await
        .with_context(|| format!("could not bind {bind}"))?;

    if register {
        let accepted = endpoint.register(peer, true).await?;
        log::info!("registration with {peer} acknowledged: {accepted}");
    }

    let envelope = Envelope::data(message.into_bytes());
    let delivered = endpoint.send(&envelope, peer, mode).await?;

    if mode == SendMode::AckNonBlocking {
        // Let the retry monitor finish before the process exits.
        while endpoint.is_pending(&envelope.checksum()) {
            tokio::time::sleep(endpoint.config().monitor_interval).await;
        }
    }

    let stats = endpoint.stats();
    let acknowledged = match mode {
        SendMode::AckBlocking => delivered,
        SendMode::AckNonBlocking => stats.dropped == 0,
        SendMode::FireAndForget | SendMode::Burst => true,
    };
    let outcome = if acknowledged { "ok" } else { "unacknowledged" };
    println!("{} -> {peer}: {outcome}", envelope.checksum());

    endpoint.shutdown();
    log::debug!("final stats: {stats:?}");
    if acknowledged {
        Ok(())
    } else {
        anyhow::bail!("{peer} never acknowledged {}", envelope.checksum())
    }
}
