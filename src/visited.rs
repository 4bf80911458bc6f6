use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Claimed by a worker whose probe hasn't finished yet.
    Pending,
    Accepted,
    Rejected,
}

/// Run-scoped record of every endpoint key a worker has taken on.
///
/// [`VisitedSet::claim`] is the only way in, so concurrent workers racing on the same key
/// get exactly one winner.
#[derive(Debug, Default)]
pub struct VisitedSet {
    visits: Mutex<HashMap<String, Visit>>,
}

impl VisitedSet {
    /// Returns `true` if `key` was not seen before in this run; the caller now owns it.
    pub async fn claim(&self, key: &str) -> bool {
        let mut visits = self.visits.lock().await;
        if visits.contains_key(key) {
            return false;
        }
        visits.insert(key.to_string(), Visit::Pending);
        true
    }

    pub async fn accept(&self, key: &str) {
        self.visits
            .lock()
            .await
            .insert(key.to_string(), Visit::Accepted);
    }

    pub async fn reject(&self, key: &str) {
        self.visits
            .lock()
            .await
            .insert(key.to_string(), Visit::Rejected);
    }

    pub async fn status(&self, key: &str) -> Option<Visit> {
        self.visits.lock().await.get(key).copied()
    }

    pub async fn len(&self) -> usize {
        self.visits.lock().await.len()
    }
}

/// Keys that failed a reachability or status check, in the order they failed.
#[derive(Debug, Default)]
pub struct FailureLog {
    failed: Mutex<Vec<String>>,
}

impl FailureLog {
    pub async fn record(&self, key: String) {
        self.failed.lock().await.push(key);
    }

    pub async fn entries(&self) -> Vec<String> {
        self.failed.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn claim_has_a_single_winner() {
        let visited = Arc::new(VisitedSet::default());
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let visited = visited.clone();
                tokio::spawn(async move { visited.claim("a@1.2.3.4:100").await })
            })
            .collect();

        let winners = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|won| *won.as_ref().unwrap())
            .count();

        assert_eq!(winners, 1);
        assert_eq!(visited.len().await, 1);
    }

    #[tokio::test]
    async fn resolved_keys_stay_claimed() {
        let visited = VisitedSet::default();
        assert!(visited.claim("a").await);
        assert_eq!(visited.status("a").await, Some(Visit::Pending));

        visited.reject("a").await;
        assert_eq!(visited.status("a").await, Some(Visit::Rejected));
        assert!(!visited.claim("a").await);

        assert!(visited.claim("b").await);
        visited.accept("b").await;
        assert_eq!(visited.status("b").await, Some(Visit::Accepted));
        assert_eq!(visited.status("c").await, None);
    }

    #[tokio::test]
    async fn failure_log_keeps_order() {
        let failures = FailureLog::default();
        failures.record("b".to_string()).await;
        failures.record("a".to_string()).await;
        assert_eq!(failures.entries().await, vec!["b", "a"]);
    }
}
