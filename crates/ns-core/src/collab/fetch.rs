//! One-shot HTTP fetches: genesis, state-sync trust point, public address.

use serde_json::Value;
use std::io::Read;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Connect timeout for every request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall timeout for a single request, body included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound on a genesis document.
pub const MAX_GENESIS_BYTES: usize = 256 * 1024 * 1024;

/// Upper bound on a daemon binary download.
pub const MAX_BINARY_BYTES: usize = 512 * 1024 * 1024;

/// Upper bound on small JSON/text responses.
pub const MAX_SMALL_BYTES: usize = 1024 * 1024;

/// Distance below the latest block used as the state-sync trust height.
pub const TRUST_HEIGHT_OFFSET: u64 = 2000;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not reach {url}: {message}")]
    Transport { url: String, message: String },

    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },

    #[error("unexpected response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("reading response from {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    fn invalid(url: &str, message: impl Into<String>) -> Self {
        FetchError::InvalidResponse {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

impl From<FetchError> for ns_common::Error {
    fn from(err: FetchError) -> Self {
        ns_common::Error::Fetch(err.to_string())
    }
}

/// Blocking HTTP client with bounded bodies.
#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(REQUEST_TIMEOUT)
    }
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(timeout)
            .user_agent(concat!("node-setup/", env!("CARGO_PKG_VERSION")))
            .build();
        HttpClient { agent }
    }

    /// GET a body of at most `limit` bytes.
    pub fn get_bytes(&self, url: &str, limit: usize) -> Result<Vec<u8>, FetchError> {
        debug!(url, "http get");
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                })
            }
            Err(other) => {
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    message: other.to_string(),
                })
            }
        };

        let mut body = Vec::new();
        response
            .into_reader()
            .take(limit as u64 + 1)
            .read_to_end(&mut body)
            .map_err(|source| FetchError::Io {
                url: url.to_string(),
                source,
            })?;
        if body.len() > limit {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit,
            });
        }
        trace!(url, bytes = body.len(), "http body received");
        Ok(body)
    }

    pub fn get_text(&self, url: &str, limit: usize) -> Result<String, FetchError> {
        let body = self.get_bytes(url, limit)?;
        String::from_utf8(body).map_err(|_| FetchError::invalid(url, "body is not UTF-8"))
    }

    pub fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let text = self.get_text(url, MAX_SMALL_BYTES)?;
        serde_json::from_str(&text).map_err(|e| FetchError::invalid(url, e.to_string()))
    }
}

// ============================================================================
// Genesis
// ============================================================================

pub trait GenesisFetcher {
    /// Fetch the raw genesis text (a document or an RPC `/genesis` envelope).
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpGenesisFetcher {
    client: HttpClient,
}

impl HttpGenesisFetcher {
    pub fn new(client: HttpClient) -> Self {
        HttpGenesisFetcher { client }
    }
}

impl GenesisFetcher for HttpGenesisFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.client.get_text(url, MAX_GENESIS_BYTES)
    }
}

// ============================================================================
// State-sync trust point
// ============================================================================

/// A trusted header for state sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPoint {
    pub height: u64,
    pub hash: String,
}

pub trait TrustFetcher {
    /// Derive a trust point from a CometBFT RPC server.
    fn fetch_trust_point(&self, rpc: &str) -> Result<TrustPoint, FetchError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpTrustFetcher {
    client: HttpClient,
}

impl HttpTrustFetcher {
    pub fn new(client: HttpClient) -> Self {
        HttpTrustFetcher { client }
    }
}

impl TrustFetcher for HttpTrustFetcher {
    fn fetch_trust_point(&self, rpc: &str) -> Result<TrustPoint, FetchError> {
        let base = rpc.trim_end_matches('/');
        let latest_url = format!("{}/block", base);
        let latest = block_height(&latest_url, &self.client.get_json(&latest_url)?)?;
        let height = trust_height_for(latest);

        let url = format!("{}/block?height={}", base, height);
        let hash = block_hash(&url, &self.client.get_json(&url)?)?;
        debug!(rpc = base, latest, height, "derived trust point");
        Ok(TrustPoint { height, hash })
    }
}

/// Trust height a fixed distance below the latest block.
pub fn trust_height_for(latest: u64) -> u64 {
    latest.saturating_sub(TRUST_HEIGHT_OFFSET).max(1)
}

/// `result` of a JSON-RPC reply, or the reply itself for bare responses.
fn rpc_result(value: &Value) -> &Value {
    value.get("result").unwrap_or(value)
}

fn block_height(url: &str, value: &Value) -> Result<u64, FetchError> {
    let height = rpc_result(value)
        .pointer("/block/header/height")
        .ok_or_else(|| FetchError::invalid(url, "missing block.header.height"))?;
    // CometBFT encodes int64 as strings
    match height {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
    .ok_or_else(|| FetchError::invalid(url, format!("bad height {}", height)))
}

fn block_hash(url: &str, value: &Value) -> Result<String, FetchError> {
    let hash = rpc_result(value)
        .pointer("/block_id/hash")
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::invalid(url, "missing block_id.hash"))?;
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FetchError::invalid(url, format!("bad block hash '{}'", hash)));
    }
    Ok(hash.to_ascii_uppercase())
}

// ============================================================================
// Public address
// ============================================================================

pub trait AddressProbe {
    /// Public IP address of this host as seen from outside.
    fn public_ip(&self) -> Result<IpAddr, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpAddressProbe {
    client: HttpClient,
    url: String,
}

impl HttpAddressProbe {
    pub fn new(url: impl Into<String>) -> Self {
        HttpAddressProbe {
            client: HttpClient::new(Duration::from_secs(10)),
            url: url.into(),
        }
    }
}

impl AddressProbe for HttpAddressProbe {
    fn public_ip(&self) -> Result<IpAddr, FetchError> {
        let text = self.client.get_text(&self.url, 256)?;
        text.trim()
            .parse()
            .map_err(|_| FetchError::invalid(&self.url, format!("'{}' is not an IP", text.trim())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HASH: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";

    #[test]
    fn test_trust_height_offset() {
        assert_eq!(trust_height_for(10_000), 8_000);
        assert_eq!(trust_height_for(500), 1);
    }

    #[test]
    fn test_block_height_from_envelope() {
        let v = json!({"jsonrpc": "2.0", "result": {"block": {"header": {"height": "12345"}}}});
        assert_eq!(block_height("u", &v).unwrap(), 12345);
    }

    #[test]
    fn test_block_height_bare_numeric() {
        let v = json!({"block": {"header": {"height": 77}}});
        assert_eq!(block_height("u", &v).unwrap(), 77);
    }

    #[test]
    fn test_block_height_missing() {
        let err = block_height("http://rpc/block", &json!({"result": {}})).unwrap_err();
        assert!(err.to_string().contains("block.header.height"));
    }

    #[test]
    fn test_block_hash_uppercased() {
        let v = json!({"result": {"block_id": {"hash": HASH}}});
        assert_eq!(block_hash("u", &v).unwrap(), HASH.to_ascii_uppercase());
    }

    #[test]
    fn test_block_hash_rejects_short() {
        let v = json!({"result": {"block_id": {"hash": "abcd"}}});
        assert!(block_hash("u", &v).is_err());
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        let client = HttpClient::new(Duration::from_secs(2));
        let err = client.get_bytes("http://127.0.0.1:9/genesis.json", 1024).unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }

    #[test]
    fn test_into_common_error() {
        let err: ns_common::Error = FetchError::Status {
            url: "https://x".into(),
            status: 404,
        }
        .into();
        assert_eq!(err.code(), 42);
    }
}
