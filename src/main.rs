use clap::{Parser, ValueEnum};
use punto_arena::*;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Fixed,
    Fair,
    Skewed,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SideArg {
    A,
    B,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::A => Side::A,
            SideArg::B => Side::B,
        }
    }
}

/// Run AI-vs-AI tournaments against a match service
#[derive(Parser, Debug)]
#[command(name = "punto-arena", version)]
struct Cli {
    /// Base URL of the match service
    #[arg(long, env = "ARENA_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    #[arg(long, default_value_t = DEFAULT_ROUNDS)]
    rounds: u32,

    #[arg(long, value_enum, default_value = "fixed")]
    policy: PolicyArg,

    /// Side receiving low-skewed decks (skewed policy)
    #[arg(long, value_enum, default_value = "b")]
    weak_side: SideArg,

    /// First round with skewed decks (skewed policy)
    #[arg(long, default_value_t = 1)]
    skew_from: u32,

    /// Last round with skewed decks (skewed policy)
    #[arg(long, default_value_t = 5)]
    skew_to: u32,

    /// Start with pool B on AI 1
    #[arg(long)]
    swap: bool,

    /// Seed for generated decks
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = 50)]
    poll_ms: u64,

    /// Pause between rounds
    #[arg(long, default_value_t = 1000)]
    pause_ms: u64,

    /// Per-request backend timeout; waits indefinitely when omitted
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Serve the web API on this address instead of running headless
    #[arg(long)]
    serve: Option<SocketAddr>,

    /// Directory of presentation assets served alongside the API
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> ArenaConfig {
        let policy = match self.policy {
            PolicyArg::Fixed => DeckPolicy::FixedPairing,
            PolicyArg::Fair => DeckPolicy::GeneratedFair,
            PolicyArg::Skewed => DeckPolicy::GeneratedSkewed {
                weak_side: self.weak_side.into(),
                weak_rounds: self.skew_from..=self.skew_to,
            },
        };
        ArenaConfig {
            api_url: self.api_url.clone(),
            rounds: self.rounds,
            policy,
            swapped: self.swap,
            seed: self.seed,
            poll_interval: Duration::from_millis(self.poll_ms),
            round_pause: Duration::from_millis(self.pause_ms),
            request_timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("punto_arena=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    let backend = HttpBackend::new(&config.api_url, config.request_timeout)?;
    tracing::info!(api = backend.base_url(), policy = config.policy.name(), "arena configured");
    let arena = Arena::new(&config, Arc::new(backend))?;

    if let Some(addr) = cli.serve {
        return punto_arena::web::run_server(arena, addr, cli.static_dir).await;
    }

    println!("Punto Arena - AI Tournament");
    println!("===========================\n");

    arena.start_tournament()?;
    arena.wait().await;

    let snapshot = arena.snapshot();
    println!("{}\n", snapshot.status);
    if snapshot.phase != Phase::TournamentComplete {
        return Err(snapshot.status.into());
    }

    println!("{}", arena.report());
    Ok(())
}
