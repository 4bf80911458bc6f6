use crate::ranking::DiscoveryResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Destination of a run's output lists.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Replace the ranked list with `ranked`, best first.
    async fn write_ranked(&self, ranked: &[DiscoveryResult]) -> Result<(), Error>;

    /// Replace the failure list with `failed`.
    async fn write_failed(&self, failed: &[String]) -> Result<(), Error>;
}

/// Writes the ranked list as one comma separated line and the failures one per line.
#[derive(Debug, Clone)]
pub struct FileSink {
    ranked_path: PathBuf,
    failed_path: PathBuf,
}

impl FileSink {
    pub fn new(ranked_path: impl Into<PathBuf>, failed_path: impl Into<PathBuf>) -> Self {
        Self {
            ranked_path: ranked_path.into(),
            failed_path: failed_path.into(),
        }
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn write_ranked(&self, ranked: &[DiscoveryResult]) -> Result<(), Error> {
        for result in ranked {
            info!(
                "Connection: {}, {}{}",
                result.endpoint_key,
                result.score,
                result
                    .moniker
                    .as_deref()
                    .map(|moniker| format!(", moniker {}", moniker))
                    .unwrap_or_default()
            );
        }
        let line = ranked
            .iter()
            .map(|result| result.endpoint_key.as_str())
            .collect::<Vec<_>>()
            .join(",");
        write(&self.ranked_path, line).await?;
        info!(
            "Saved top {} connections to {}",
            ranked.len(),
            self.ranked_path.display()
        );
        Ok(())
    }

    async fn write_failed(&self, failed: &[String]) -> Result<(), Error> {
        let contents: String = failed.iter().map(|key| format!("{}\n", key)).collect();
        write(&self.failed_path, contents).await?;
        info!(
            "Saved {} failed connections to {}",
            failed.len(),
            self.failed_path.display()
        );
        Ok(())
    }
}

async fn write(path: &Path, contents: String) -> Result<(), Error> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
