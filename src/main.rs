mod address;
mod explorer;
mod prober;
mod ranking;
mod rpc;
mod sink;
mod source;
mod tracing_helper;
mod visited;

use clap::Parser;
use explorer::{ExplorerConfig, NetworkExplorer};
use prober::TcpProber;
use ranking::RankMode;
use rpc::HttpNodeInfoClient;
use sink::{FileSink, Sink};
use source::SeedSource;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_SEED_SOURCE: &str = "https://rpc-initia-testnet.trusted-point.com/peers.txt";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The number of ranked nodes to keep.
    #[arg(short = 'n', long, default_value = "40")]
    count: usize,

    /// Where to write the ranked, comma separated list.
    /// Defaults to `top_ips_ports_nodeinfo.txt` in height mode, `top_ips_ports.txt` in latency
    /// mode and `top_peers_from_rpc.txt` when seeding from `--rpc`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Where to write the endpoints that failed a reachability or status check.
    #[arg(long, default_value = "failed_connections.txt")]
    failed_output: PathBuf,

    /// The seed list: a local file or an http(s) URL holding `id@host:port` entries
    /// separated by commas.
    #[arg(short, long, default_value = DEFAULT_SEED_SOURCE, conflicts_with = "rpc")]
    source: String,

    /// Seed from the peer table of the node whose RPC listens at this URL,
    /// e.g. `http://localhost:26657`.
    #[arg(long)]
    rpc: Option<String>,

    /// Rank by chain height or by connect latency.
    #[arg(short, long, value_enum, default_value_t = RankMode::Height)]
    mode: RankMode,

    /// The number of peer expansion rounds. Defaults to 1 in height mode and 0 in latency mode.
    #[arg(short, long)]
    rounds: Option<usize>,

    /// The TCP connection timeout, in milliseconds.
    #[arg(short, long, default_value = "2000")]
    connection_timeout_ms: u64,

    /// The timeout of every RPC request, in milliseconds.
    #[arg(long, default_value = "1000")]
    rpc_timeout_ms: u64,

    /// The max number of probes and RPC calls in flight at once.
    #[arg(long, default_value = "10")]
    max_concurrent_tasks: usize,
}

impl Args {
    fn explorer_config(&self) -> ExplorerConfig {
        let default_rounds = match self.mode {
            RankMode::Height => 1,
            RankMode::Latency => 0,
        };
        ExplorerConfig {
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
            mode: self.mode,
            rounds: self.rounds.unwrap_or(default_rounds),
            max_concurrent_tasks: self.max_concurrent_tasks,
        }
    }

    fn seed_source(&self) -> Result<SeedSource, source::Error> {
        match &self.rpc {
            Some(rpc) => SeedSource::net_info(rpc),
            None => SeedSource::from_location(&self.source),
        }
    }
}

fn default_output(mode: RankMode, source: &SeedSource) -> PathBuf {
    let name = match (source, mode) {
        (SeedSource::NetInfo(_), _) => "top_peers_from_rpc.txt",
        (_, RankMode::Height) => "top_ips_ports_nodeinfo.txt",
        (_, RankMode::Latency) => "top_ips_ports.txt",
    };
    PathBuf::from(name)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_helper::init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => {
            info!("Processing completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("An error occurred: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let client = HttpNodeInfoClient::new(Duration::from_millis(args.rpc_timeout_ms))?;
    let source = args.seed_source()?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(args.mode, &source));
    let seeds = source.load(&client).await?;

    // Stop issuing probes on Ctrl-C but still rank and write what was found.
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, waiting for in-flight probes to finish");
                cancel.cancel();
            }
        }
    });

    info!("Start network exploration");
    let start = Instant::now();
    let exploration = NetworkExplorer::new(
        Arc::new(TcpProber),
        Arc::new(client),
        args.explorer_config(),
        cancel,
    )
    .explore(seeds)
    .await;
    info!(
        "Accepted {} nodes and rejected {} in {}secs",
        exploration.results.len(),
        exploration.failed.len(),
        start.elapsed().as_secs()
    );

    let ranked = args.mode.rank(exploration.results, args.count);
    let sink = FileSink::new(output, args.failed_output);
    sink.write_ranked(&ranked).await?;
    sink.write_failed(&exploration.failed).await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)]
    Client(#[from] rpc::Error),
    #[error(transparent)]
    Source(#[from] source::Error),
    #[error(transparent)]
    Sink(#[from] sink::Error),
}
