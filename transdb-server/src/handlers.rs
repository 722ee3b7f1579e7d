use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream;
use serde::Deserialize;
use transdb_common::{wire, Value, NEVER_EXPIRES};

use crate::error::{error_response, CoordError};
use crate::peer_client::ReplicaGetOutcome;
use crate::validation::{parse_replicas, validate_key};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EntityParams {
    pub id: String,
    pub replicas: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub start: String,
    pub end: Option<String>,
}

pub async fn handle_status() -> StatusCode {
    StatusCode::OK
}

fn is_proxy_request(headers: &HeaderMap) -> bool {
    headers.contains_key(wire::PROXY_HEADER)
}

fn expires_at_from_header(headers: &HeaderMap) -> u64 {
    match headers.get(wire::EXPIRES_HEADER).and_then(|v| v.to_str().ok()) {
        // A malformed Expires header is not an error — it silently reverts
        // to NEVER_EXPIRES.
        None => NEVER_EXPIRES,
        Some(wire::NEVER_EXPIRES_TOKEN) => NEVER_EXPIRES,
        Some(s) => s.parse().unwrap_or(NEVER_EXPIRES),
    }
}

fn timestamp_from_header(headers: &HeaderMap) -> Result<u64, Response> {
    headers
        .get(wire::TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            error_response(StatusCode::BAD_REQUEST, "proxy request missing timestamp header")
        })
}

fn proxy_get_response(outcome: ReplicaGetOutcome) -> Response {
    match outcome {
        ReplicaGetOutcome::Absent => StatusCode::NOT_FOUND.into_response(),
        ReplicaGetOutcome::Tombstone { timestamp } => {
            let mut response = StatusCode::NOT_FOUND.into_response();
            insert_timestamp_header(&mut response, timestamp);
            response
        }
        ReplicaGetOutcome::Live(value) => {
            let mut response = (StatusCode::OK, value.data.clone()).into_response();
            insert_timestamp_header(&mut response, value.timestamp);
            insert_expires_at_header(&mut response, value.expires_at);
            response
        }
    }
}

fn insert_timestamp_header(response: &mut Response, timestamp: u64) {
    if let Ok(value) = HeaderValue::from_str(&timestamp.to_string()) {
        response.headers_mut().insert(wire::TIMESTAMP_HEADER, value);
    }
}

fn insert_expires_at_header(response: &mut Response, expires_at: u64) {
    let raw = if expires_at == NEVER_EXPIRES {
        wire::NEVER_EXPIRES_TOKEN.to_string()
    } else {
        expires_at.to_string()
    };
    if let Ok(value) = HeaderValue::from_str(&raw) {
        response.headers_mut().insert(wire::EXPIRES_AT_HEADER, value);
    }
}

pub async fn handle_get(State(state): State<AppState>, Query(params): Query<EntityParams>, headers: HeaderMap) -> Response {
    let key = match validate_key(&params.id) {
        Ok(k) => k,
        Err(e) => return e.into_response(),
    };

    if is_proxy_request(&headers) {
        return match state.coordinator.proxy_get(&key).await {
            Ok(outcome) => proxy_get_response(outcome),
            Err(e) => e.into_response(),
        };
    }

    let (ack, from) = match parse_replicas(
        params.replicas.as_deref(),
        state.coordinator.cluster_size(),
        state.coordinator.quorum_count(),
    ) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };

    match state.coordinator.originating_get(&key, ack, from).await {
        Ok(Some(data)) => (StatusCode::OK, data).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Key not found: {}", params.id)),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_put(
    State(state): State<AppState>,
    Query(params): Query<EntityParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let key = match validate_key(&params.id) {
        Ok(k) => k,
        Err(e) => return e.into_response(),
    };
    if body.len() > transdb_common::MAX_VALUE_SIZE {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Value exceeds maximum size of {} bytes", transdb_common::MAX_VALUE_SIZE),
        );
    }

    let expires_at = expires_at_from_header(&headers);

    if is_proxy_request(&headers) {
        let timestamp = match timestamp_from_header(&headers) {
            Ok(ts) => ts,
            Err(r) => return r,
        };
        let value = Value::live(timestamp, expires_at, body);
        return match state.coordinator.proxy_put(&key, value).await {
            Ok(()) => StatusCode::CREATED.into_response(),
            Err(e) => e.into_response(),
        };
    }

    let (ack, from) = match parse_replicas(
        params.replicas.as_deref(),
        state.coordinator.cluster_size(),
        state.coordinator.quorum_count(),
    ) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };

    match state.coordinator.originating_put(&key, body, expires_at, ack, from).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_delete(State(state): State<AppState>, Query(params): Query<EntityParams>, headers: HeaderMap) -> Response {
    let key = match validate_key(&params.id) {
        Ok(k) => k,
        Err(e) => return e.into_response(),
    };

    if is_proxy_request(&headers) {
        let timestamp = match timestamp_from_header(&headers) {
            Ok(ts) => ts,
            Err(r) => return r,
        };
        return match state.coordinator.proxy_delete(&key, timestamp).await {
            Ok(()) => StatusCode::ACCEPTED.into_response(),
            Err(e) => e.into_response(),
        };
    }

    let (ack, from) = match parse_replicas(
        params.replicas.as_deref(),
        state.coordinator.cluster_size(),
        state.coordinator.quorum_count(),
    ) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };

    match state.coordinator.originating_delete(&key, ack, from).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Streams records as newline-delimited `key\tdata` chunks in ascending key
/// order. Not replicated — delegates straight to the local store. Using
/// `Body::from_stream` over a `futures::Stream` means hyper only pulls the
/// next chunk once the transport is ready to accept it: the coordinator
/// never needs its own backpressure bookkeeping.
pub async fn handle_range(State(state): State<AppState>, Query(params): Query<RangeParams>) -> Response {
    if params.start.is_empty() {
        return CoordError::BadParameters("start must be non-empty".to_string()).into_response();
    }
    if let Some(end) = &params.end {
        if end.is_empty() {
            return CoordError::BadParameters("end must be non-empty when present".to_string()).into_response();
        }
    }

    let start = params.start.as_bytes().to_vec();
    let end = params.end.as_ref().map(|s| s.as_bytes().to_vec());

    let records = match state.coordinator.range_scan(&start, end.as_deref()).await {
        Ok(records) => records,
        Err(e) => return e.into_response(),
    };

    let chunks: Vec<Result<Bytes, std::io::Error>> = records
        .into_iter()
        .map(|record| {
            let mut line = Vec::with_capacity(record.key.len() + record.data.len() + 2);
            line.extend_from_slice(&record.key);
            line.push(b'\t');
            line.extend_from_slice(&record.data);
            line.push(b'\n');
            Ok(Bytes::from(line))
        })
        .collect();

    let body = Body::from_stream(stream::iter(chunks));
    Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, "application/octet-stream")
        .body(body)
        .expect("static response parts are always valid")
}
