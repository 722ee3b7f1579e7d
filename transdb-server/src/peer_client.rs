use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::Semaphore;
use transdb_common::{wire, Topology, Value, NEVER_EXPIRES};

/// Outcome of a proxied GET against a single replica, encoding absence and
/// tombstones as distinguishable sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaGetOutcome {
    Absent,
    Tombstone { timestamp: u64 },
    Live(Value),
}

/// A transport or protocol failure talking to a peer; the coordinator only
/// ever sees this as "this replica failed" — it does not leak further.
#[derive(Debug, Clone)]
pub struct PeerError(pub String);

/// Async HTTP client issuing proxied single-replica requests with a timeout.
/// Cheaply `Clone` (reqwest's client and the pool's semaphore are both
/// reference-counted internally).
#[derive(Clone)]
pub struct HttpPeerClient {
    node: String,
    http: reqwest::Client,
    timeout: Duration,
    pool: Arc<Semaphore>,
}

impl HttpPeerClient {
    pub fn new(node: String, timeout: Duration, pool: Arc<Semaphore>) -> Self {
        Self { node, http: reqwest::Client::new(), timeout, pool }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.node, path)
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, PeerError> {
        self.pool.acquire().await.map_err(|_| PeerError("proxy pool closed".to_string()))
    }

    pub async fn get(&self, key: &[u8]) -> Result<ReplicaGetOutcome, PeerError> {
        let _permit = self.acquire().await?;
        let key_str = String::from_utf8_lossy(key).into_owned();
        let fut = self
            .http
            .get(self.url(wire::PATH_ENTITY))
            .query(&[(wire::QUERY_ID, key_str)])
            .header(wire::PROXY_HEADER, "true")
            .send();

        let response = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| PeerError(format!("timed out contacting {}", self.node)))?
            .map_err(|e| PeerError(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => match parse_timestamp_header(response.headers()) {
                Some(timestamp) => Ok(ReplicaGetOutcome::Tombstone { timestamp }),
                None => Ok(ReplicaGetOutcome::Absent),
            },
            StatusCode::OK => {
                let timestamp = parse_timestamp_header(response.headers())
                    .ok_or_else(|| PeerError("proxy GET response missing timestamp header".to_string()))?;
                let expires_at = parse_expires_at_header(response.headers());
                let data = response.bytes().await.map_err(|e| PeerError(e.to_string()))?;
                Ok(ReplicaGetOutcome::Live(Value::live(timestamp, expires_at, data)))
            }
            other => Err(PeerError(format!("unexpected status {} from {}", other, self.node))),
        }
    }

    pub async fn put(&self, key: &[u8], value: &Value) -> Result<(), PeerError> {
        let _permit = self.acquire().await?;
        let key_str = String::from_utf8_lossy(key).into_owned();
        let expires_header = expires_header_value(value.expires_at);
        let fut = self
            .http
            .put(self.url(wire::PATH_ENTITY))
            .query(&[(wire::QUERY_ID, key_str)])
            .header(wire::PROXY_HEADER, "true")
            .header(wire::TIMESTAMP_HEADER, value.timestamp.to_string())
            .header(wire::EXPIRES_HEADER, expires_header)
            .body(value.data.clone())
            .send();

        let response = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| PeerError(format!("timed out contacting {}", self.node)))?
            .map_err(|e| PeerError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PeerError(format!("unexpected status {} from {}", response.status(), self.node)))
        }
    }

    pub async fn delete(&self, key: &[u8], timestamp: u64) -> Result<(), PeerError> {
        let _permit = self.acquire().await?;
        let key_str = String::from_utf8_lossy(key).into_owned();
        let fut = self
            .http
            .delete(self.url(wire::PATH_ENTITY))
            .query(&[(wire::QUERY_ID, key_str)])
            .header(wire::PROXY_HEADER, "true")
            .header(wire::TIMESTAMP_HEADER, timestamp.to_string())
            .send();

        let response = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| PeerError(format!("timed out contacting {}", self.node)))?
            .map_err(|e| PeerError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PeerError(format!("unexpected status {} from {}", response.status(), self.node)))
        }
    }
}

fn expires_header_value(expires_at: u64) -> String {
    if expires_at == NEVER_EXPIRES {
        wire::NEVER_EXPIRES_TOKEN.to_string()
    } else {
        expires_at.to_string()
    }
}

fn parse_timestamp_header(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers.get(wire::TIMESTAMP_HEADER)?.to_str().ok()?.parse().ok()
}

fn parse_expires_at_header(headers: &reqwest::header::HeaderMap) -> u64 {
    match headers.get(wire::EXPIRES_AT_HEADER).and_then(|v| v.to_str().ok()) {
        None | Some(wire::NEVER_EXPIRES_TOKEN) => NEVER_EXPIRES,
        Some(s) => s.parse().unwrap_or(NEVER_EXPIRES),
    }
}

/// Owns one persistent peer client per remote node, keyed by node
/// identifier. Duplicate nodes are already rejected by `Topology::new`, so
/// construction here cannot itself produce a duplicate.
pub struct PeerRegistry {
    clients: HashMap<String, HttpPeerClient>,
}

impl PeerRegistry {
    pub fn new(topology: &Topology, timeout: Duration, pool: Arc<Semaphore>) -> Self {
        let clients = topology
            .all()
            .iter()
            .filter(|node| !topology.is_local(node))
            .map(|node| (node.clone(), HttpPeerClient::new(node.clone(), timeout, pool.clone())))
            .collect();
        Self { clients }
    }

    pub fn get(&self, node: &str) -> HttpPeerClient {
        self.clients.get(node).cloned().unwrap_or_else(|| panic!("no peer client registered for {}", node))
    }
}

