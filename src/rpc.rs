//! Client for the administrative RPC interface of Tendermint-style nodes.
//!
//! The [`NodeInfoClient`] trait never fails: nodes are third-party and most P2P ports have
//! no RPC next to them, so any transport or decoding problem collapses into "unknown"
//! (no height) or "empty" (no peers). The inherent `fetch_*` methods of
//! [`HttpNodeInfoClient`] keep the error for callers that must tell the difference.

use crate::address::{port_from_addr, Endpoint};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a node reports about itself on `/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub endpoint: Endpoint,
    /// `None` when the node could not be queried or returned nothing usable.
    pub height: Option<u64>,
    pub moniker: Option<String>,
}

impl NodeStatus {
    pub fn unknown(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            height: None,
            moniker: None,
        }
    }
}

/// One entry of a node's peer table, with both ports already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub node_id: String,
    pub remote_ip: String,
    pub rpc_port: u16,
    pub p2p_port: u16,
}

impl PeerRecord {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(
            Some(self.node_id.clone()),
            self.remote_ip.clone(),
            self.p2p_port,
        )
    }

    fn from_raw(peer: RawPeer) -> Result<Self, Error> {
        let RawPeer { node_info, remote_ip } = peer;
        let rpc_port = port_from_addr(&node_info.other.rpc_address).ok_or_else(|| {
            Error::InvalidRpcPort {
                node_id: node_info.id.clone(),
                remote_ip: remote_ip.clone(),
            }
        })?;
        let p2p_port = port_from_addr(&node_info.listen_addr).ok_or_else(|| {
            Error::InvalidP2pPort {
                node_id: node_info.id.clone(),
                remote_ip: remote_ip.clone(),
            }
        })?;
        Ok(Self {
            node_id: node_info.id,
            remote_ip,
            rpc_port,
            p2p_port,
        })
    }
}

#[async_trait]
pub trait NodeInfoClient: Send + Sync {
    /// Query `/status`. Any failure yields a status with `height == None`.
    async fn get_status(&self, endpoint: &Endpoint, rpc_port: u16) -> NodeStatus;

    /// Query `/net_info`. Peers with unusable ports are dropped; any failure yields an
    /// empty list.
    async fn get_net_info(&self, host: &str, rpc_port: u16) -> Vec<PeerRecord>;
}

#[derive(Debug, Clone)]
pub struct HttpNodeInfoClient {
    client: Client,
}

impl HttpNodeInfoClient {
    /// Build a client whose every request is bounded by `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }

    /// Fetch `(height, moniker)` from `{base_url}/status`.
    pub async fn fetch_status(&self, base_url: &str) -> Result<(u64, Option<String>), Error> {
        let status: StatusResult = self.get(&format!("{}/status", base_url)).await?;
        let height = parse_height(&status.sync_info.latest_block_height)
            .ok_or_else(|| Error::InvalidHeight(status.sync_info.latest_block_height.to_string()))?;
        Ok((height, status.node_info.moniker))
    }

    /// Fetch the peer table from `{base_url}/net_info`, dropping peers whose ports don't parse.
    pub async fn fetch_net_info(&self, base_url: &str) -> Result<Vec<PeerRecord>, Error> {
        let net_info: NetInfoResult = self.get(&format!("{}/net_info", base_url)).await?;
        let peers: Vec<PeerRecord> = net_info
            .peers
            .into_iter()
            .filter_map(|peer| match PeerRecord::from_raw(peer) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping peer reported by {}: {}", base_url, e);
                    None
                }
            })
            .collect();
        info!("Number of peers for {} is {}", base_url, peers.len());
        Ok(peers)
    }

    /// GET `url` and return the body as text, under the same timeout as the RPC calls.
    pub async fn fetch_text(&self, url: &str) -> Result<String, Error> {
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.text().await?),
            status => Err(Error::Status(status)),
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.json::<RpcResponse<T>>().await?.result),
            status => Err(Error::Status(status)),
        }
    }
}

#[async_trait]
impl NodeInfoClient for HttpNodeInfoClient {
    async fn get_status(&self, endpoint: &Endpoint, rpc_port: u16) -> NodeStatus {
        match self.fetch_status(&base_url(&endpoint.host, rpc_port)).await {
            Ok((height, moniker)) => NodeStatus {
                endpoint: endpoint.clone(),
                height: Some(height),
                moniker,
            },
            Err(e) => {
                debug!("No status from {}:{}: {}", endpoint.host, rpc_port, e);
                NodeStatus::unknown(endpoint.clone())
            }
        }
    }

    async fn get_net_info(&self, host: &str, rpc_port: u16) -> Vec<PeerRecord> {
        self.fetch_net_info(&base_url(host, rpc_port))
            .await
            .unwrap_or_else(|e| {
                debug!("No peer table from {}:{}: {}", host, rpc_port, e);
                Vec::new()
            })
    }
}

fn base_url(host: &str, rpc_port: u16) -> String {
    format!("http://{}:{}", host, rpc_port)
}

/// Heights are numeric strings on the wire; plain numbers are accepted as well.
fn parse_height(value: &Value) -> Option<u64> {
    match value {
        Value::String(height) => height.parse().ok(),
        Value::Number(height) => height.as_u64(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    #[serde(default)]
    node_info: StatusNodeInfo,
    sync_info: SyncInfo,
}

#[derive(Debug, Default, Deserialize)]
struct StatusNodeInfo {
    moniker: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    latest_block_height: Value,
}

#[derive(Debug, Deserialize)]
struct NetInfoResult {
    #[serde(default)]
    peers: Vec<RawPeer>,
}

// Missing fields default to empty strings so that one broken peer entry is rejected
// on its own instead of failing the whole table.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPeer {
    node_info: RawNodeInfo,
    remote_ip: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNodeInfo {
    id: String,
    listen_addr: String,
    other: RawOther,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOther {
    rpc_address: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Unexpected status: {0}")]
    Status(StatusCode),
    #[error("Unparseable block height: {0}")]
    InvalidHeight(String),
    #[error("Invalid RPC port received for peer {node_id} at {remote_ip}")]
    InvalidRpcPort { node_id: String, remote_ip: String },
    #[error("Invalid p2p port received for peer {node_id} at {remote_ip}")]
    InvalidP2pPort { node_id: String, remote_ip: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpNodeInfoClient {
        HttpNodeInfoClient::new(Duration::from_secs(1)).unwrap()
    }

    fn endpoint_of(server: &MockServer) -> (Endpoint, u16) {
        let addr = server.address();
        (
            Endpoint::new(Some("node".to_string()), addr.ip().to_string(), 26656),
            addr.port(),
        )
    }

    fn peer(id: &str, ip: &str, rpc_address: &str, listen_addr: &str) -> Value {
        json!({
            "node_info": {
                "id": id,
                "listen_addr": listen_addr,
                "other": { "rpc_address": rpc_address }
            },
            "remote_ip": ip
        })
    }

    #[tokio::test]
    async fn status_reports_height_and_moniker() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "node_info": { "moniker": "validator-1" },
                    "sync_info": { "latest_block_height": "1000" }
                }
            })))
            .mount(&mock_server)
            .await;

        let (endpoint, port) = endpoint_of(&mock_server);
        let status = client().get_status(&endpoint, port).await;

        assert_eq!(status.height, Some(1000));
        assert_eq!(status.moniker.as_deref(), Some("validator-1"));
        assert_eq!(status.endpoint, endpoint);
    }

    #[tokio::test]
    async fn status_is_unknown_on_error_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let (endpoint, port) = endpoint_of(&mock_server);
        let status = client().get_status(&endpoint, port).await;

        assert_eq!(status, NodeStatus::unknown(endpoint));
    }

    #[tokio::test]
    async fn status_is_unknown_on_bad_payload() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": { "sync_info": { "latest_block_height": "not-a-height" } }
            })))
            .mount(&mock_server)
            .await;

        let (endpoint, port) = endpoint_of(&mock_server);
        assert_eq!(client().get_status(&endpoint, port).await.height, None);

        let err = client()
            .fetch_status(&mock_server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHeight(_)));
    }

    #[tokio::test]
    async fn status_is_unknown_on_invalid_json() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&mock_server)
            .await;

        let (endpoint, port) = endpoint_of(&mock_server);
        assert_eq!(client().get_status(&endpoint, port).await.height, None);
    }

    #[tokio::test]
    async fn net_info_drops_peers_with_bad_ports() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/net_info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "peers": [
                        peer("good", "1.1.1.1", "tcp://0.0.0.0:26657", "tcp://0.0.0.0:26656"),
                        peer("no-rpc", "2.2.2.2", "tcp://0.0.0.0:", "tcp://0.0.0.0:26656"),
                        peer("no-p2p", "3.3.3.3", "tcp://0.0.0.0:26657", ""),
                        peer("junk", "4.4.4.4", "tcp://0.0.0.0:abc", "tcp://0.0.0.0:26656"),
                        { "remote_ip": "5.5.5.5" }
                    ]
                }
            })))
            .mount(&mock_server)
            .await;

        let addr = mock_server.address();
        let peers = client()
            .get_net_info(&addr.ip().to_string(), addr.port())
            .await;

        assert_eq!(
            peers,
            vec![PeerRecord {
                node_id: "good".to_string(),
                remote_ip: "1.1.1.1".to_string(),
                rpc_port: 26657,
                p2p_port: 26656,
            }]
        );
        assert_eq!(peers[0].endpoint().key(), "good@1.1.1.1:26656");
    }

    #[tokio::test]
    async fn net_info_is_empty_on_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/net_info"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let addr = mock_server.address();
        assert!(client()
            .get_net_info(&addr.ip().to_string(), addr.port())
            .await
            .is_empty());
    }

    #[test]
    fn height_accepts_strings_and_numbers() {
        assert_eq!(parse_height(&json!("42")), Some(42));
        assert_eq!(parse_height(&json!(42)), Some(42));
        assert_eq!(parse_height(&json!("-1")), None);
        assert_eq!(parse_height(&json!(null)), None);
    }
}
