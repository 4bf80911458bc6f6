use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// A node address as it appears in peer lists: `node_id@host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub network_id: Option<String>,
    pub host: String,
    pub p2p_port: u16,
}

impl Endpoint {
    pub fn new(network_id: Option<String>, host: impl Into<String>, p2p_port: u16) -> Self {
        Self {
            network_id: network_id.filter(|id| !id.is_empty()),
            host: host.into(),
            p2p_port,
        }
    }

    /// Canonical key used for deduplication and in the output files.
    pub fn key(&self) -> String {
        match &self.network_id {
            Some(id) => format!("{}@{}:{}", id, self.host, self.p2p_port),
            None => format!("{}:{}", self.host, self.p2p_port),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// An endpoint waiting to be probed, with its RPC port when a peer table told us about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub endpoint: Endpoint,
    pub rpc_port: Option<u16>,
}

impl Candidate {
    pub fn new(endpoint: Endpoint, rpc_port: Option<u16>) -> Self {
        Self { endpoint, rpc_port }
    }

    /// The RPC port to query. Nodes conventionally expose RPC right above the P2P port,
    /// which is only a fallback for when no explicit port is known.
    pub fn rpc_port(&self) -> Option<u16> {
        self.rpc_port
            .or_else(|| self.endpoint.p2p_port.checked_add(1))
    }
}

/// Parse a single `node_id@host:port` token.
pub fn parse_endpoint(token: &str) -> Result<Endpoint, Error> {
    let parts: Vec<&str> = token.split('@').collect();
    let [node_id, host_port] = parts.as_slice() else {
        return Err(Error::MissingNodeId(token.to_string()));
    };
    let host_port: Vec<&str> = host_port.split(':').collect();
    let [host, port] = host_port.as_slice() else {
        return Err(Error::MissingPort(token.to_string()));
    };
    if host.is_empty() {
        return Err(Error::MissingHost(token.to_string()));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| Error::InvalidPort(token.to_string()))?;

    Ok(Endpoint::new(Some(node_id.to_string()), *host, port))
}

/// Parse a comma separated seed list. Malformed tokens are logged and skipped,
/// duplicates are collapsed keeping the first occurrence.
pub fn parse_seed_list(list: &str) -> Vec<Endpoint> {
    let mut seen = HashSet::new();
    let mut endpoints = Vec::new();
    for token in list.split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }
        match parse_endpoint(token) {
            Ok(endpoint) => {
                if seen.insert(endpoint.key()) {
                    endpoints.push(endpoint);
                } else {
                    debug!("Skipping duplicate seed {}", token);
                }
            }
            Err(e) => warn!("Dropping seed: {}", e),
        }
    }
    endpoints
}

/// Extract the port from the tail of an address such as `tcp://0.0.0.0:26657`.
/// Only non-empty, positive ports are accepted.
pub fn port_from_addr(addr: &str) -> Option<u16> {
    let (_, port) = addr.rsplit_once(':')?;
    match port.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expected exactly one '@' in {0:?}")]
    MissingNodeId(String),
    #[error("expected host:port in {0:?}")]
    MissingPort(String),
    #[error("empty host in {0:?}")]
    MissingHost(String),
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_token() {
        let endpoint = parse_endpoint("abc@10.0.0.1:26656").unwrap();
        assert_eq!(endpoint.network_id.as_deref(), Some("abc"));
        assert_eq!(endpoint.host, "10.0.0.1");
        assert_eq!(endpoint.p2p_port, 26656);
        assert_eq!(endpoint.key(), "abc@10.0.0.1:26656");
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(matches!(
            parse_endpoint("badtoken"),
            Err(Error::MissingNodeId(_))
        ));
        assert!(matches!(
            parse_endpoint("a@b@1.2.3.4:1"),
            Err(Error::MissingNodeId(_))
        ));
        assert!(matches!(parse_endpoint("id@host"), Err(Error::MissingPort(_))));
        assert!(matches!(
            parse_endpoint("id@host:notanumber"),
            Err(Error::InvalidPort(_))
        ));
        assert!(matches!(
            parse_endpoint("id@host:70000"),
            Err(Error::InvalidPort(_))
        ));
        assert!(matches!(parse_endpoint("id@:80"), Err(Error::MissingHost(_))));
    }

    #[test]
    fn key_without_network_id() {
        let endpoint = Endpoint::new(None, "1.2.3.4", 100);
        assert_eq!(endpoint.key(), "1.2.3.4:100");
        let endpoint = Endpoint::new(Some(String::new()), "1.2.3.4", 100);
        assert_eq!(endpoint.key(), "1.2.3.4:100");
    }

    #[test]
    fn seed_list_skips_bad_and_duplicate_tokens() {
        let seeds = parse_seed_list(
            "a@1.2.3.4:100,badtoken,b@5.6.7.8:200,id@host,a@1.2.3.4:100,,id@host:x\n",
        );
        let keys: Vec<String> = seeds.iter().map(Endpoint::key).collect();
        assert_eq!(keys, vec!["a@1.2.3.4:100", "b@5.6.7.8:200"]);
    }

    #[test]
    fn rpc_port_prefers_explicit_value() {
        let endpoint = Endpoint::new(Some("a".into()), "1.2.3.4", 26656);
        assert_eq!(Candidate::new(endpoint.clone(), None).rpc_port(), Some(26657));
        assert_eq!(Candidate::new(endpoint, Some(443)).rpc_port(), Some(443));

        let top = Endpoint::new(Some("a".into()), "1.2.3.4", u16::MAX);
        assert_eq!(Candidate::new(top, None).rpc_port(), None);
    }

    #[test]
    fn port_from_addr_requires_positive_port() {
        assert_eq!(port_from_addr("tcp://0.0.0.0:26657"), Some(26657));
        assert_eq!(port_from_addr("1.2.3.4:26656"), Some(26656));
        assert_eq!(port_from_addr("tcp://0.0.0.0:"), None);
        assert_eq!(port_from_addr("tcp://0.0.0.0:0"), None);
        assert_eq!(port_from_addr("no-port"), None);
        assert_eq!(port_from_addr(""), None);
    }
}
