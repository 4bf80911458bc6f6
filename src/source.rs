use crate::address::{parse_seed_list, Candidate};
use crate::rpc::{self, HttpNodeInfoClient};
use reqwest::StatusCode;
use std::path::PathBuf;
use tracing::info;
use url::Url;

/// Where the seed list of a run comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSource {
    /// A local file holding a comma separated `id@host:port` list.
    File(PathBuf),
    /// A remote document in the same format.
    Url(Url),
    /// The RPC base URL of a node; its peer table becomes the seed list.
    NetInfo(Url),
}

impl SeedSource {
    /// `http://` and `https://` locations are fetched, anything else is read from disk.
    pub fn from_location(location: &str) -> Result<Self, Error> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let url = Url::parse(location).map_err(|e| Error::InvalidUrl(location.to_string(), e))?;
            Ok(SeedSource::Url(url))
        } else {
            Ok(SeedSource::File(PathBuf::from(location)))
        }
    }

    pub fn net_info(rpc_url: &str) -> Result<Self, Error> {
        let url = Url::parse(rpc_url).map_err(|e| Error::InvalidUrl(rpc_url.to_string(), e))?;
        Ok(SeedSource::NetInfo(url))
    }

    /// Load and parse the seeds. Malformed entries are dropped; only an unreadable source
    /// is an error.
    pub async fn load(&self, client: &HttpNodeInfoClient) -> Result<Vec<Candidate>, Error> {
        let seeds: Vec<Candidate> = match self {
            SeedSource::File(path) => {
                let list = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| Error::Read {
                        path: path.clone(),
                        source,
                    })?;
                into_candidates(&list)
            }
            SeedSource::Url(url) => {
                let list = client
                    .fetch_text(url.as_str())
                    .await
                    .map_err(|e| match e {
                        rpc::Error::Status(status) => Error::Status(url.clone(), status),
                        e => Error::Rpc(e),
                    })?;
                into_candidates(&list)
            }
            SeedSource::NetInfo(url) => client
                .fetch_net_info(url.as_str().trim_end_matches('/'))
                .await?
                .into_iter()
                .map(|peer| Candidate::new(peer.endpoint(), Some(peer.rpc_port)))
                .collect(),
        };
        info!("Loaded {} seeds from {}", seeds.len(), self);
        Ok(seeds)
    }
}

impl std::fmt::Display for SeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedSource::File(path) => write!(f, "{}", path.display()),
            SeedSource::Url(url) => write!(f, "{}", url),
            SeedSource::NetInfo(url) => write!(f, "{} (net_info)", url),
        }
    }
}

fn into_candidates(list: &str) -> Vec<Candidate> {
    parse_seed_list(list)
        .into_iter()
        .map(|endpoint| Candidate::new(endpoint, None))
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid URL {0:?}: {1}")]
    InvalidUrl(String, url::ParseError),
    #[error("Failed to read seed file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to retrieve the seed list from {0}: {1}")]
    Status(Url, StatusCode),
    #[error("Failed to fetch seeds: {0}")]
    Rpc(#[from] rpc::Error),
}
