//! Entry point: a `coordinator` spins up the round engine and drives rounds
//! continuously; a `miner` dials in and mines against whatever target the
//! coordinator announces (spec §4.1, §10.3).

mod coordinator;
mod error;
mod miner;
mod wire;

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use coordinator::Coordinator;
use miner::Miner;

#[derive(Parser)]
#[command(name = "powsim")]
#[command(about = "Educational proof-of-work network simulator")]
struct Cli {
    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator: accepts miner connections and drives rounds.
    Coordinator {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 65432)]
        port: u16,
        #[arg(long, default_value_t = shared::BASE_DIFFICULTY)]
        base_difficulty: u8,
    },
    /// Run a miner: connects to a coordinator and mines/votes.
    Miner {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 65432)]
        port: u16,
    },
}

fn init_logging(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Coordinator {
            host,
            port,
            base_difficulty,
        } => run_coordinator(&host, port, base_difficulty),
        Commands::Miner { host, port } => run_miner(&host, port),
    }
}

/// Accepts connections on a background thread, then drives mining rounds
/// back-to-back forever. `announce_mine` is UI-invoked in the reference
/// design; this binary's "UI" is a continuous loop that starts the next
/// round as soon as at least one miner is connected.
fn run_coordinator(host: &str, port: u16, base_difficulty: u8) {
    let coordinator = match Coordinator::bind(host, port, base_difficulty) {
        Ok(c) => c,
        Err(err) => {
            warn!(%err, "failed to bind coordinator socket");
            return;
        }
    };
    info!(%host, %port, %base_difficulty, "coordinator listening");

    std::thread::scope(|scope| {
        scope.spawn(|| {
            if let Err(err) = coordinator.accept_loop() {
                warn!(%err, "accept loop terminated");
            }
        });

        loop {
            if coordinator.node_count() == 0 {
                std::thread::sleep(Duration::from_millis(500));
                continue;
            }
            coordinator.run_round();
        }
    });
}

fn run_miner(host: &str, port: u16) {
    let miner = match Miner::connect(host, port) {
        Ok(m) => m,
        Err(err) => {
            warn!(%err, %host, %port, "failed to connect to coordinator");
            return;
        }
    };
    info!(%host, %port, "miner connected to coordinator");
    if let Err(err) = miner.run() {
        warn!(%err, "miner connection terminated");
    }
}
