use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tokio::sync::Semaphore;
use transdb_common::{Topology, MAX_VALUE_SIZE};

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod peer_client;
pub mod quorum;
pub mod store;
pub mod validation;

pub use clock::{Clock, SystemClock};
pub use coordinator::Coordinator;
pub use peer_client::PeerRegistry;
pub use store::{InMemoryStore, LocalStore};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

/// Startup configuration for a node.
#[derive(Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    pub topology: Topology,
    pub proxy_timeout: Duration,
    pub dao_pool_size: usize,
    pub proxy_pool_size: usize,
    pub shutdown_grace_period: Duration,
}

impl ServerConfig {
    pub fn new(address: SocketAddr, topology: Topology) -> Self {
        Self {
            address,
            topology,
            proxy_timeout: config::DEFAULT_PROXY_TIMEOUT,
            dao_pool_size: config::DEFAULT_DAO_POOL_SIZE,
            proxy_pool_size: config::DEFAULT_PROXY_POOL_SIZE,
            shutdown_grace_period: config::SHUTDOWN_GRACE_PERIOD,
        }
    }
}

pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn address(&self) -> SocketAddr {
        self.config.address
    }

    pub fn build_state(config: &ServerConfig) -> AppState {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store: Arc<dyn LocalStore> = Arc::new(InMemoryStore::new(clock.clone()));
        let proxy_pool = Arc::new(Semaphore::new(config.proxy_pool_size));
        let dao_pool = Arc::new(Semaphore::new(config.dao_pool_size));
        let peers = PeerRegistry::new(&config.topology, config.proxy_timeout, proxy_pool);
        let shutting_down = Arc::new(AtomicBool::new(false));

        let coordinator =
            Arc::new(Coordinator::new(store, config.topology.clone(), peers, clock, dao_pool, shutting_down));
        AppState { coordinator }
    }

    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route(transdb_common::wire::PATH_STATUS, get(handlers::handle_status))
            .route(
                transdb_common::wire::PATH_ENTITY,
                get(handlers::handle_get).put(handlers::handle_put).delete(handlers::handle_delete),
            )
            .route(transdb_common::wire::PATH_ENTITIES, get(handlers::handle_range))
            // Allow bodies up to MAX_VALUE_SIZE + 1 so handlers can validate and return 400;
            // axum's default 2MB limit would otherwise return 413 for oversized values.
            .layer(DefaultBodyLimit::max(MAX_VALUE_SIZE + 1))
            .with_state(state)
    }

    /// Runs the server, signalling `ready_tx` with the bound address once
    /// accepting connections, and shutting down gracefully on Ctrl-C.
    pub async fn run(self, ready_tx: tokio::sync::oneshot::Sender<SocketAddr>) -> Result<(), Box<dyn std::error::Error>> {
        let state = Self::build_state(&self.config);
        let coordinator = state.coordinator.clone();
        let shutting_down = coordinator.shutting_down_flag();
        let app = Self::create_router(state);

        let listener = tokio::net::TcpListener::bind(self.config.address).await?;
        let local_addr = listener.local_addr()?;
        ready_tx.send(local_addr).ok();

        let grace_period = self.config.shutdown_grace_period;
        let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutting_down));

        // Both pools live inside `state` (dropped with `serve`'s future); bound how long we
        // wait for in-flight requests to drain before giving up.
        let result = match tokio::time::timeout(grace_period, serve).await {
            Ok(result) => result.map_err(|e| e.into()),
            Err(_) => {
                eprintln!("graceful shutdown did not finish within {:?}; exiting anyway", grace_period);
                Ok(())
            }
        };

        // Local store and peer client handles are released once the listener and
        // all connections have been torn down.
        coordinator.close().await;
        result
    }
}

async fn shutdown_signal(shutting_down: Arc<AtomicBool>) {
    tokio::signal::ctrl_c().await.ok();
    shutting_down.store(true, Ordering::SeqCst);
}
