use std::fmt;
use std::time::Duration;

/// How a run scores and orders the nodes it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RankMode {
    /// Highest chain height first. Nodes must answer `/status`.
    Height,
    /// Lowest connect latency first. Reachability alone is enough.
    Latency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Score {
    Height(u64),
    Latency(Duration),
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Height(height) => write!(f, "height {}", height),
            Score::Latency(latency) => write!(f, "latency {:.4}s", latency.as_secs_f64()),
        }
    }
}

/// An accepted node and the score it is ranked by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    pub endpoint_key: String,
    pub score: Score,
    pub moniker: Option<String>,
}

impl RankMode {
    /// Order `results` best first and keep at most `count` of them.
    pub fn rank(self, results: Vec<DiscoveryResult>, count: usize) -> Vec<DiscoveryResult> {
        match self {
            RankMode::Height => rank_by_key(results, |result| result.score, true, count),
            RankMode::Latency => rank_by_key(results, |result| result.score, false, count),
        }
    }
}

/// Stable sort by `key_fn` then truncate to `count`. Equal keys keep their accumulation
/// order.
pub fn rank_by_key<T, K, F>(mut items: Vec<T>, key_fn: F, descending: bool, count: usize) -> Vec<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    if descending {
        items.sort_by(|a, b| key_fn(b).cmp(&key_fn(a)));
    } else {
        items.sort_by_key(&key_fn);
    }
    items.truncate(count);
    items
}
