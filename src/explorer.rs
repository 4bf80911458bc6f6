use crate::address::{Candidate, Endpoint};
use crate::prober::ReachabilityProber;
use crate::ranking::{DiscoveryResult, RankMode, Score};
use crate::rpc::{NodeInfoClient, PeerRecord};
use crate::visited::{FailureLog, VisitedSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// Timeout of every TCP reachability probe.
    pub connection_timeout: Duration,
    pub mode: RankMode,
    /// Number of peer expansion rounds after the seed phase.
    pub rounds: usize,
    /// Upper bound on probes and RPC calls in flight at once.
    pub max_concurrent_tasks: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            mode: RankMode::Height,
            rounds: 1,
            max_concurrent_tasks: 10,
        }
    }
}

/// The outcome of one exploration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exploration {
    /// Accepted nodes in accumulation order, not yet ranked.
    pub results: Vec<DiscoveryResult>,
    /// Keys that failed reachability or status checks.
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Seed,
    /// Learnt from a peer table; failing a status check lands in the failure log.
    Peer,
}

/// A node that passed every check, kept around so its peer table can be expanded.
#[derive(Debug, Clone)]
struct Accepted {
    endpoint: Endpoint,
    /// `None` for latency-mode nodes on port 65535 without an advertised RPC port.
    rpc_port: Option<u16>,
    result: DiscoveryResult,
}

pub struct NetworkExplorer<P, C> {
    shared: Arc<Shared<P, C>>,
    rounds: usize,
}

struct Shared<P, C> {
    prober: Arc<P>,
    client: Arc<C>,
    connection_timeout: Duration,
    mode: RankMode,
    visited: VisitedSet,
    failures: FailureLog,
    semaphore: Semaphore,
    cancel: CancellationToken,
}

impl<P, C> NetworkExplorer<P, C>
where
    P: ReachabilityProber + 'static,
    C: NodeInfoClient + 'static,
{
    /// Creates an explorer for a single run. The visited set and failure log live as long
    /// as the explorer, so a fresh explorer is needed for every run.
    ///
    /// Cancelling `cancel` stops new probes from being issued; probes already in flight
    /// finish or time out, and [`NetworkExplorer::explore`] returns what was found so far.
    pub fn new(
        prober: Arc<P>,
        client: Arc<C>,
        config: ExplorerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                prober,
                client,
                connection_timeout: config.connection_timeout,
                mode: config.mode,
                visited: VisitedSet::default(),
                failures: FailureLog::default(),
                semaphore: Semaphore::new(config.max_concurrent_tasks.max(1)),
                cancel,
            }),
            rounds: config.rounds,
        }
    }

    /// Probes the seeds, then expands through the peer tables of accepted nodes for the
    /// configured number of rounds.
    ///
    /// # Behavior
    ///
    /// - Every endpoint key is probed at most once per run, however many peer tables
    ///   list it.
    /// - Each phase fans out over the whole frontier and completes before the next
    ///   frontier is computed.
    /// - Round 1 adds its nodes to the seed results. Every later round replaces the
    ///   results with the nodes it found, so the output samples the outermost frontier.
    pub async fn explore(self, seeds: Vec<Candidate>) -> Exploration {
        info!("Start probing {} seeds", seeds.len());
        let seeded = self.run_phase(seeds, Origin::Seed).await;
        info!("{} seeds accepted", seeded.len());

        let mut results: Vec<DiscoveryResult> =
            seeded.iter().map(|accepted| accepted.result.clone()).collect();
        let mut frontier = seeded;

        for round in 1..=self.rounds {
            if self.shared.cancel.is_cancelled() {
                info!("Exploration cancelled before round {}", round);
                break;
            }
            let candidates = self.collect_peers(&frontier).await;
            let found = self.run_phase(candidates, Origin::Peer).await;
            let found_results = found.iter().map(|accepted| accepted.result.clone());
            if round == 1 {
                results.extend(found_results);
            } else {
                results = found_results.collect();
            }
            info!(
                "Round {}/{} completed. {} new nodes accepted, {} endpoints visited.",
                round,
                self.rounds,
                found.len(),
                self.shared.visited.len().await
            );
            frontier = found;
        }

        Exploration {
            results,
            failed: self.shared.failures.entries().await,
        }
    }

    /// Fetch the peer tables of every frontier node and turn them into candidates.
    async fn collect_peers(&self, frontier: &[Accepted]) -> Vec<Candidate> {
        let tasks: Vec<JoinHandle<Vec<PeerRecord>>> = frontier
            .iter()
            .filter_map(|accepted| Some((accepted.endpoint.host.clone(), accepted.rpc_port?)))
            .map(|(host, rpc_port)| {
                let shared = self.shared.clone();
                tokio::spawn(async move {
                    let _permit = shared.semaphore.acquire().await;
                    if shared.cancel.is_cancelled() {
                        return Vec::new();
                    }
                    shared.client.get_net_info(&host, rpc_port).await
                })
            })
            .collect();

        futures::future::join_all(tasks)
            .await
            .into_iter()
            .flat_map(|joined| {
                joined.unwrap_or_else(|e| {
                    error!("Peer table task failed: {}", e);
                    Vec::new()
                })
            })
            .map(|peer| Candidate::new(peer.endpoint(), Some(peer.rpc_port)))
            .collect()
    }

    /// Evaluate every candidate concurrently and return the accepted ones in candidate order.
    async fn run_phase(&self, candidates: Vec<Candidate>, origin: Origin) -> Vec<Accepted> {
        let tasks: Vec<JoinHandle<Option<Accepted>>> = candidates
            .into_iter()
            .map(|candidate| {
                let shared = self.shared.clone();
                tokio::spawn(async move { shared.evaluate(candidate, origin).await })
            })
            .collect();

        futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter_map(|joined| {
                joined.unwrap_or_else(|e| {
                    error!("Probe task failed: {}", e);
                    None
                })
            })
            .collect()
    }
}

impl<P, C> Shared<P, C>
where
    P: ReachabilityProber,
    C: NodeInfoClient,
{
    /// Probe a single candidate and, in height mode, ask it for its status.
    async fn evaluate(&self, candidate: Candidate, origin: Origin) -> Option<Accepted> {
        let _permit = self.semaphore.acquire().await;
        if self.cancel.is_cancelled() {
            return None;
        }
        let key = candidate.endpoint.key();
        if !self.visited.claim(&key).await {
            debug!(
                "Skipping {}, already visited ({:?})",
                key,
                self.visited.status(&key).await
            );
            return None;
        }

        // An advertised RPC port is probed directly, list seeds on their P2P port.
        let probe_port = candidate.rpc_port.unwrap_or(candidate.endpoint.p2p_port);
        let rpc_port = candidate.rpc_port();
        let probe = self
            .prober
            .probe(&candidate.endpoint, probe_port, self.connection_timeout)
            .await;
        let Some(latency) = probe.connect_latency.filter(|_| probe.reachable) else {
            debug!(
                "Failed to connect to {} on port {}",
                probe.endpoint, probe.port
            );
            self.reject(key, true).await;
            return None;
        };

        let result = match self.mode {
            RankMode::Latency => {
                info!(
                    "Successfully connected to {} with response time {:.4} seconds",
                    key,
                    latency.as_secs_f64()
                );
                DiscoveryResult {
                    endpoint_key: key,
                    score: Score::Latency(latency),
                    moniker: None,
                }
            }
            RankMode::Height => {
                let Some(rpc_port) = rpc_port else {
                    debug!("No RPC port for {}", key);
                    self.reject(key, origin == Origin::Peer).await;
                    return None;
                };
                let status = self.client.get_status(&candidate.endpoint, rpc_port).await;
                let Some(height) = status.height else {
                    debug!("{} is reachable but reported no block height", key);
                    // A seed without RPC is common and not worth reporting.
                    self.reject(key, origin == Origin::Peer).await;
                    return None;
                };
                info!(
                    "block_height {} {} with {}",
                    status.moniker.as_deref().unwrap_or("-"),
                    status.endpoint,
                    height
                );
                DiscoveryResult {
                    endpoint_key: key,
                    score: Score::Height(height),
                    moniker: status.moniker,
                }
            }
        };

        self.visited.accept(&result.endpoint_key).await;
        Some(Accepted {
            endpoint: candidate.endpoint,
            rpc_port,
            result,
        })
    }

    async fn reject(&self, key: String, record_failure: bool) {
        self.visited.reject(&key).await;
        if record_failure {
            self.failures.record(key).await;
        }
    }
}
