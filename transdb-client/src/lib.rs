use transdb_common::{wire, ErrorResponse, Result, TransDbError, MAX_KEY_SIZE, MAX_VALUE_SIZE, NEVER_EXPIRES};

/// Client-side cluster configuration: the set of node addresses (`host:port`)
/// a client may talk to. Unlike `transdb_common::Topology`, a client is not
/// itself a cluster member, so there is no `local_node`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub nodes: Vec<String>,
}

/// Desired quorum for a single request; `None` lets the server apply its
/// default (`quorum/clusterSize`).
pub type Replicas = Option<(usize, usize)>;

/// TransDB Client. Issues requests against whichever node is currently the
/// target; any node in the cluster can originate a request regardless of
/// which replicas actually hold the key.
pub struct Client {
    config: ClientConfig,
    target: String,
    http_client: reqwest::Client,
}

impl Client {
    /// Create a new client; the first node in `config.nodes` is the initial target.
    pub fn new(config: ClientConfig) -> Self {
        let target = config.nodes.first().cloned().unwrap_or_default();
        Self { config, target, http_client: reqwest::Client::new() }
    }

    pub fn nodes(&self) -> &[String] {
        &self.config.nodes
    }

    /// Overrides the target node for all subsequent requests. Pass a bare
    /// `host:port` address matching an entry in the cluster's node list.
    pub fn set_target(&mut self, addr: &str) {
        self.target = addr.to_string();
    }

    fn entity_url(&self) -> String {
        format!("http://{}{}", self.target, wire::PATH_ENTITY)
    }

    fn entities_url(&self) -> String {
        format!("http://{}{}", self.target, wire::PATH_ENTITIES)
    }

    fn replicas_query(replicas: Replicas) -> Option<String> {
        replicas.map(|(ack, from)| format!("{}/{}", ack, from))
    }

    /// Fetch a value by key under the requested quorum. Returns
    /// `KeyNotFound` if the key is absent, tombstoned, or expired.
    pub async fn get(&self, key: &str, replicas: Replicas) -> Result<Vec<u8>> {
        validate_key(key)?;

        let mut query = vec![(wire::QUERY_ID.to_string(), key.to_string())];
        if let Some(r) = Self::replicas_query(replicas) {
            query.push((wire::QUERY_REPLICAS.to_string(), r));
        }

        let response = self
            .http_client
            .get(self.entity_url())
            .query(&query)
            .send()
            .await
            .map_err(|e| TransDbError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, key, response).await);
        }

        response.bytes().await.map(|b| b.to_vec()).map_err(|e| TransDbError::NetworkError(e.to_string()))
    }

    /// Store `value` under `key`. `expires_at` is an absolute millis-since-
    /// epoch deadline, or `None`/`NEVER_EXPIRES` for no expiration.
    pub async fn put(&self, key: &str, value: &[u8], expires_at: Option<u64>, replicas: Replicas) -> Result<()> {
        validate_key(key)?;
        if value.len() > MAX_VALUE_SIZE {
            return Err(TransDbError::ValueTooLarge(MAX_VALUE_SIZE));
        }

        let mut query = vec![(wire::QUERY_ID.to_string(), key.to_string())];
        if let Some(r) = Self::replicas_query(replicas) {
            query.push((wire::QUERY_REPLICAS.to_string(), r));
        }

        let mut request = self.http_client.put(self.entity_url()).query(&query).body(value.to_vec());
        if let Some(ts) = expires_at {
            if ts != NEVER_EXPIRES {
                request = request.header(wire::EXPIRES_HEADER, ts.to_string());
            }
        }

        let response = request.send().await.map_err(|e| TransDbError::NetworkError(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, key, response).await);
        }
        Ok(())
    }

    /// Delete the value stored under `key` (tombstones it).
    pub async fn delete(&self, key: &str, replicas: Replicas) -> Result<()> {
        validate_key(key)?;

        let mut query = vec![(wire::QUERY_ID.to_string(), key.to_string())];
        if let Some(r) = Self::replicas_query(replicas) {
            query.push((wire::QUERY_REPLICAS.to_string(), r));
        }

        let response = self
            .http_client
            .delete(self.entity_url())
            .query(&query)
            .send()
            .await
            .map_err(|e| TransDbError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, key, response).await);
        }
        Ok(())
    }

    /// Range scan `[start, end)` against the local store of whichever node is
    /// the current target; not replicated. Records are returned in ascending
    /// key order, tombstones and expired records already filtered.
    pub async fn range(&self, start: &str, end: Option<&str>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if start.is_empty() {
            return Err(TransDbError::HttpError(400, "start must be non-empty".to_string()));
        }

        let mut query = vec![(wire::QUERY_START.to_string(), start.to_string())];
        if let Some(e) = end {
            query.push((wire::QUERY_END.to_string(), e.to_string()));
        }

        let response = self
            .http_client
            .get(self.entities_url())
            .query(&query)
            .send()
            .await
            .map_err(|e| TransDbError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, start, response).await);
        }

        let body = response.bytes().await.map_err(|e| TransDbError::NetworkError(e.to_string()))?;
        Ok(parse_range_body(&body))
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(TransDbError::HttpError(400, "id must be non-empty".to_string()));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(TransDbError::KeyTooLarge(MAX_KEY_SIZE));
    }
    Ok(())
}

/// Parses the server's newline-delimited `key\tdata` chunk stream.
fn parse_range_body(body: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    body.split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let tab = line.iter().position(|&b| b == b'\t')?;
            Some((line[..tab].to_vec(), line[tab + 1..].to_vec()))
        })
        .collect()
}

async fn parse_error_response(status: reqwest::StatusCode, key: &str, response: reqwest::Response) -> TransDbError {
    if status == reqwest::StatusCode::NOT_FOUND {
        return TransDbError::KeyNotFound(key.to_string());
    }

    let error_msg = response
        .json::<ErrorResponse>()
        .await
        .map(|r| r.error)
        .unwrap_or_else(|_| format!("Server returned status: {}", status));

    TransDbError::HttpError(status.as_u16(), error_msg)
}
