use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use tokio::sync::Semaphore;
use transdb_common::{wire, Topology, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use transdb_server::coordinator::Coordinator;
use transdb_server::handlers::{handle_delete, handle_get, handle_put, handle_range, handle_status, EntityParams, RangeParams};
use transdb_server::peer_client::PeerRegistry;
use transdb_server::store::InMemoryStore;
use transdb_server::{AppState, Clock, LocalStore};

const NOW: u64 = 10_000;

struct MockClock(AtomicU64);

impl MockClock {
    fn new(now: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(now)))
    }

    fn advance_to(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn unix_now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single-node cluster: every request's default quorum is 1/1, so tests
/// can focus on handler/coordinator behavior without juggling peer mocks.
struct TestNode {
    state: AppState,
    clock: Arc<MockClock>,
}

fn single_node() -> TestNode {
    let clock = MockClock::new(NOW);
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let store: Arc<dyn LocalStore> = Arc::new(InMemoryStore::new(dyn_clock.clone()));
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let topology = Topology::new(vec![addr.to_string()], addr.to_string()).unwrap();
    let peers = PeerRegistry::new(&topology, Duration::from_secs(1), Arc::new(Semaphore::new(8)));
    let shutting_down = Arc::new(AtomicBool::new(false));
    let coordinator =
        Arc::new(Coordinator::new(store, topology, peers, dyn_clock, Arc::new(Semaphore::new(8)), shutting_down));
    TestNode { state: AppState { coordinator }, clock }
}

fn params(id: &str) -> EntityParams {
    EntityParams { id: id.to_string(), replicas: None }
}

fn params_with_replicas(id: &str, replicas: &str) -> EntityParams {
    EntityParams { id: id.to_string(), replicas: Some(replicas.to_string()) }
}

fn proxy_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(wire::PROXY_HEADER, "true".parse().unwrap());
    headers
}

fn proxy_headers_with_timestamp(ts: u64) -> HeaderMap {
    let mut headers = proxy_headers();
    headers.insert(wire::TIMESTAMP_HEADER, ts.to_string().parse().unwrap());
    headers
}

async fn body_of(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn put(node: &TestNode, key: &str, value: &[u8]) -> Response {
    handle_put(State(node.state.clone()), Query(params(key)), HeaderMap::new(), Bytes::from(value.to_vec())).await
}

async fn get(node: &TestNode, key: &str) -> Response {
    handle_get(State(node.state.clone()), Query(params(key)), HeaderMap::new()).await
}

async fn delete(node: &TestNode, key: &str) -> Response {
    handle_delete(State(node.state.clone()), Query(params(key)), HeaderMap::new()).await
}

// --- status ---

#[tokio::test]
async fn status_is_always_ok() {
    assert_eq!(handle_status().await, StatusCode::OK);
}

// --- originating GET ---

#[tokio::test]
async fn get_missing_key_is_not_found() {
    let node = single_node();
    let response = get(&node, "missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let node = single_node();
    assert_eq!(put(&node, "k", b"v").await.status(), StatusCode::CREATED);
    let response = get(&node, "k").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_of(response).await, b"v");
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let node = single_node();
    put(&node, "k", b"v").await;
    assert_eq!(delete(&node, "k").await.status(), StatusCode::ACCEPTED);
    assert_eq!(get(&node, "k").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resurrection_after_delete() {
    let node = single_node();
    put(&node, "k", b"v1").await;
    delete(&node, "k").await;
    put(&node, "k", b"v2").await;
    let response = get(&node, "k").await;
    assert_eq!(body_of(response).await, b"v2");
}

#[tokio::test]
async fn overwrite_with_later_data_wins() {
    let node = single_node();
    put(&node, "k", b"v1").await;
    put(&node, "k", b"v2").await;
    let response = get(&node, "k").await;
    assert_eq!(body_of(response).await, b"v2");
}

// --- expiration ---

#[tokio::test]
async fn expired_entry_reads_as_not_found() {
    let node = single_node();
    let mut headers = HeaderMap::new();
    headers.insert(wire::EXPIRES_HEADER, (NOW + 100).to_string().parse().unwrap());
    handle_put(State(node.state.clone()), Query(params("k")), headers, Bytes::from_static(b"v")).await;

    assert_eq!(get(&node, "k").await.status(), StatusCode::OK);
    node.clock.advance_to(NOW + 200);
    assert_eq!(get(&node, "k").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn overwrite_without_expires_makes_key_immortal() {
    let node = single_node();
    let mut headers = HeaderMap::new();
    headers.insert(wire::EXPIRES_HEADER, (NOW + 100).to_string().parse().unwrap());
    handle_put(State(node.state.clone()), Query(params("k")), headers, Bytes::from_static(b"v1")).await;
    put(&node, "k", b"v2").await;

    node.clock.advance_to(NOW + 200);
    let response = get(&node, "k").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_of(response).await, b"v2");
}

#[tokio::test]
async fn malformed_expires_header_silently_means_never_expires() {
    let node = single_node();
    let mut headers = HeaderMap::new();
    headers.insert(wire::EXPIRES_HEADER, "not-a-number".parse().unwrap());
    let response =
        handle_put(State(node.state.clone()), Query(params("k")), headers, Bytes::from_static(b"v")).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    node.clock.advance_to(NOW + 1_000_000);
    assert_eq!(get(&node, "k").await.status(), StatusCode::OK);
}

// --- proxy path ---

#[tokio::test]
async fn proxy_get_on_absent_key_is_not_found_without_timestamp_header() {
    let node = single_node();
    let response = handle_get(State(node.state.clone()), Query(params("missing")), proxy_headers()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(wire::TIMESTAMP_HEADER).is_none());
}

#[tokio::test]
async fn proxy_get_on_tombstone_carries_timestamp_header() {
    let node = single_node();
    put(&node, "k", b"v").await;
    delete(&node, "k").await;

    let response = handle_get(State(node.state.clone()), Query(params("k")), proxy_headers()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(wire::TIMESTAMP_HEADER).is_some());
}

#[tokio::test]
async fn proxy_get_on_live_value_carries_timestamp_and_expires_at_headers() {
    let node = single_node();
    put(&node, "k", b"v").await;

    let response = handle_get(State(node.state.clone()), Query(params("k")), proxy_headers()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(wire::TIMESTAMP_HEADER).is_some());
    assert_eq!(
        response.headers().get(wire::EXPIRES_AT_HEADER).unwrap().to_str().unwrap(),
        wire::NEVER_EXPIRES_TOKEN
    );
    assert_eq!(body_of(response).await, b"v");
}

#[tokio::test]
async fn proxy_put_requires_timestamp_header() {
    let node = single_node();
    let response =
        handle_put(State(node.state.clone()), Query(params("k")), proxy_headers(), Bytes::from_static(b"v")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proxy_put_writes_exact_timestamp() {
    let node = single_node();
    let headers = proxy_headers_with_timestamp(555);
    let response = handle_put(State(node.state.clone()), Query(params("k")), headers, Bytes::from_static(b"v")).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let proxy_response = handle_get(State(node.state.clone()), Query(params("k")), proxy_headers()).await;
    assert_eq!(
        proxy_response.headers().get(wire::TIMESTAMP_HEADER).unwrap().to_str().unwrap(),
        "555"
    );
}

#[tokio::test]
async fn proxy_delete_requires_timestamp_header() {
    let node = single_node();
    let response = handle_delete(State(node.state.clone()), Query(params("k")), proxy_headers()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proxy_delete_writes_exact_timestamp() {
    let node = single_node();
    put(&node, "k", b"v").await;
    let headers = proxy_headers_with_timestamp(999);
    let response = handle_delete(State(node.state.clone()), Query(params("k")), headers).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let proxy_response = handle_get(State(node.state.clone()), Query(params("k")), proxy_headers()).await;
    assert_eq!(proxy_response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        proxy_response.headers().get(wire::TIMESTAMP_HEADER).unwrap().to_str().unwrap(),
        "999"
    );
}

// --- parameter validation ---

#[tokio::test]
async fn empty_key_is_bad_request() {
    let node = single_node();
    assert_eq!(get(&node, "").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(put(&node, "", b"v").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(delete(&node, "").await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_key_is_bad_request() {
    let node = single_node();
    let key = "a".repeat(MAX_KEY_SIZE + 1);
    assert_eq!(get(&node, &key).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_value_is_bad_request() {
    let node = single_node();
    let value = vec![0u8; MAX_VALUE_SIZE + 1];
    let response = put(&node, "k", &value).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_replicas_is_bad_request() {
    let node = single_node();
    let response = handle_get(State(node.state.clone()), Query(params_with_replicas("k", "not-a-ratio")), HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ack_greater_than_from_is_bad_request() {
    let node = single_node();
    let response = handle_get(State(node.state.clone()), Query(params_with_replicas("k", "5/1")), HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn from_greater_than_cluster_size_is_bad_request() {
    let node = single_node();
    let response = handle_get(State(node.state.clone()), Query(params_with_replicas("k", "1/5")), HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn explicit_valid_replicas_are_accepted() {
    let node = single_node();
    put(&node, "k", b"v").await;
    let response = handle_get(State(node.state.clone()), Query(params_with_replicas("k", "1/1")), HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// --- range scan ---

#[tokio::test]
async fn range_scan_excludes_tombstones_and_orders_ascending() {
    let node = single_node();
    for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
        put(&node, k, v.as_bytes()).await;
    }
    delete(&node, "b").await;

    let response = handle_range(
        State(node.state.clone()),
        Query(RangeParams { start: "a".to_string(), end: Some("d".to_string()) }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_of(response).await, b"a\t1\nc\t3\n".to_vec());
}

#[tokio::test]
async fn range_scan_excludes_expired_records() {
    let node = single_node();
    let mut headers = HeaderMap::new();
    headers.insert(wire::EXPIRES_HEADER, (NOW + 50).to_string().parse().unwrap());
    handle_put(State(node.state.clone()), Query(params("a")), headers, Bytes::from_static(b"1")).await;
    put(&node, "b", b"2").await;
    node.clock.advance_to(NOW + 100);

    let response = handle_range(
        State(node.state.clone()),
        Query(RangeParams { start: "a".to_string(), end: None }),
    )
    .await;
    assert_eq!(body_of(response).await, b"b\t2\n".to_vec());
}

#[tokio::test]
async fn range_scan_rejects_empty_start() {
    let node = single_node();
    let response = handle_range(
        State(node.state.clone()),
        Query(RangeParams { start: "".to_string(), end: None }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn range_scan_rejects_empty_end() {
    let node = single_node();
    let response = handle_range(
        State(node.state.clone()),
        Query(RangeParams { start: "a".to_string(), end: Some(String::new()) }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
