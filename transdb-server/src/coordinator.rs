use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;
use transdb_common::{Record, Topology, Value};

use crate::clock::Clock;
use crate::error::CoordError;
use crate::peer_client::{PeerRegistry, ReplicaGetOutcome};
use crate::quorum;
use crate::store::LocalStore;

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, ()>> + Send>>;

/// Orchestrates GET/PUT/DELETE: classifies proxy vs originating requests,
/// dispatches locally and to peers, feeds `QuorumCollector`, and synthesizes
/// the final outcome via the resolution rules.
pub struct Coordinator {
    store: Arc<dyn LocalStore>,
    topology: Topology,
    peers: PeerRegistry,
    clock: Arc<dyn Clock>,
    dao_pool: Arc<Semaphore>,
    shutting_down: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn LocalStore>,
        topology: Topology,
        peers: PeerRegistry,
        clock: Arc<dyn Clock>,
        dao_pool: Arc<Semaphore>,
        shutting_down: Arc<AtomicBool>,
    ) -> Self {
        Self { store, topology, peers, clock, dao_pool, shutting_down }
    }

    pub fn cluster_size(&self) -> usize {
        self.topology.size()
    }

    pub fn quorum_count(&self) -> usize {
        self.topology.quorum_count()
    }

    pub fn shutting_down_flag(&self) -> Arc<AtomicBool> {
        self.shutting_down.clone()
    }

    fn admit(&self) -> Result<tokio::sync::SemaphorePermit<'_>, CoordError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(CoordError::ShuttingDown);
        }
        self.dao_pool.try_acquire().map_err(|_| CoordError::Overloaded)
    }

    // ---- GET ----------------------------------------------------------

    /// Proxy path: this node is a replica, not an originator.
    pub async fn proxy_get(&self, key: &[u8]) -> Result<ReplicaGetOutcome, CoordError> {
        let _permit = self.admit()?;
        Ok(match self.store.get(key).await {
            None => ReplicaGetOutcome::Absent,
            Some(v) if v.tombstone => ReplicaGetOutcome::Tombstone { timestamp: v.timestamp },
            Some(v) => ReplicaGetOutcome::Live(v),
        })
    }

    /// Originating path: fan out to `from` replicas, resolve once `ack`
    /// responses have arrived.
    pub async fn originating_get(&self, key: &[u8], ack: usize, from: usize) -> Result<Option<Bytes>, CoordError> {
        let _permit = self.admit()?;
        let replicas = self.topology.primaries_for(key, from);
        let futures: Vec<BoxFuture<ReplicaGetOutcome>> = replicas
            .into_iter()
            .map(|node| self.dispatch_get(key, node))
            .collect();

        let results = quorum::collect(futures, ack).await.map_err(|_| CoordError::InsufficientReplicas)?;
        Ok(resolve_get(results, self.clock.unix_now_millis()))
    }

    fn dispatch_get(&self, key: &[u8], node: String) -> BoxFuture<ReplicaGetOutcome> {
        if self.topology.is_local(&node) {
            let store = self.store.clone();
            let key = key.to_vec();
            Box::pin(async move {
                Ok(match store.get(&key).await {
                    None => ReplicaGetOutcome::Absent,
                    Some(v) if v.tombstone => ReplicaGetOutcome::Tombstone { timestamp: v.timestamp },
                    Some(v) => ReplicaGetOutcome::Live(v),
                })
            })
        } else {
            let peer = self.peers.get(&node);
            let key = key.to_vec();
            Box::pin(async move { peer.get(&key).await.map_err(|_| ()) })
        }
    }

    // ---- PUT ------------------------------------------------------------

    /// Proxy path: write exactly the Value the originator sent.
    pub async fn proxy_put(&self, key: &[u8], value: Value) -> Result<(), CoordError> {
        let _permit = self.admit()?;
        self.store.write_at(key, value).await;
        Ok(())
    }

    /// Originating path: mint a timestamp, fan out to `from` replicas,
    /// require `ack` successes.
    pub async fn originating_put(
        &self,
        key: &[u8],
        data: Bytes,
        expires_at: u64,
        ack: usize,
        from: usize,
    ) -> Result<(), CoordError> {
        let _permit = self.admit()?;
        let value = Value::live(self.clock.unix_now_millis(), expires_at, data);
        let replicas = self.topology.primaries_for(key, from);
        let futures: Vec<BoxFuture<()>> =
            replicas.into_iter().map(|node| self.dispatch_put(key, node, value.clone())).collect();

        quorum::collect(futures, ack).await.map(|_| ()).map_err(|_| CoordError::InsufficientReplicas)
    }

    fn dispatch_put(&self, key: &[u8], node: String, value: Value) -> BoxFuture<()> {
        if self.topology.is_local(&node) {
            let store = self.store.clone();
            let key = key.to_vec();
            Box::pin(async move {
                store.write_at(&key, value).await;
                Ok(())
            })
        } else {
            let peer = self.peers.get(&node);
            let key = key.to_vec();
            Box::pin(async move { peer.put(&key, &value).await.map_err(|_| ()) })
        }
    }

    // ---- DELETE -----------------------------------------------------------

    /// Proxy path: write the tombstone the originator already stamped.
    pub async fn proxy_delete(&self, key: &[u8], timestamp: u64) -> Result<(), CoordError> {
        let _permit = self.admit()?;
        self.store.write_at(key, Value::tombstone(timestamp)).await;
        Ok(())
    }

    /// Originating path: mint a single tombstone timestamp, fan out, require
    /// `ack` successes. Deletion is equivalent to writing a tombstone; it is
    /// not a physical removal and does not block on GC.
    pub async fn originating_delete(&self, key: &[u8], ack: usize, from: usize) -> Result<(), CoordError> {
        let _permit = self.admit()?;
        let timestamp = self.clock.unix_now_millis();
        let replicas = self.topology.primaries_for(key, from);
        let futures: Vec<BoxFuture<()>> =
            replicas.into_iter().map(|node| self.dispatch_delete(key, node, timestamp)).collect();

        quorum::collect(futures, ack).await.map(|_| ()).map_err(|_| CoordError::InsufficientReplicas)
    }

    fn dispatch_delete(&self, key: &[u8], node: String, timestamp: u64) -> BoxFuture<()> {
        if self.topology.is_local(&node) {
            let store = self.store.clone();
            let key = key.to_vec();
            Box::pin(async move {
                store.write_at(&key, Value::tombstone(timestamp)).await;
                Ok(())
            })
        } else {
            let peer = self.peers.get(&node);
            let key = key.to_vec();
            Box::pin(async move { peer.delete(&key, timestamp).await.map_err(|_| ()) })
        }
    }

    // ---- Range scan -----------------------------------------------------

    /// Not replicated: delegates straight to `LocalStore::record_iterator`.
    pub async fn range_scan(&self, start: &[u8], end: Option<&[u8]>) -> Result<Vec<Record>, CoordError> {
        let _permit = self.admit()?;
        Ok(self.store.record_iterator(start, end).await)
    }

    /// Releases the local store on shutdown; all in-flight writes are durable
    /// on return. Peer client handles need no explicit release — they are
    /// dropped along with the `Coordinator`.
    pub async fn close(&self) {
        self.store.close().await;
    }
}

/// Pure resolution over a quorum of GET outcomes:
/// 1. Among live Values, group by data identity; pick the group with the
///    highest vote count, ties broken by the Value total order (smaller
///    wins — i.e. newer timestamp).
/// 2. Among tombstones, take the newest by timestamp.
/// 3. A tombstone newer than the chosen live Value wins (`NOT_FOUND`).
/// 4. Otherwise the chosen live Value wins, subject to the expiration filter.
fn resolve_get(results: Vec<ReplicaGetOutcome>, now: u64) -> Option<Bytes> {
    let mut newest_tombstone: Option<u64> = None;
    let mut live_votes: HashMap<Vec<u8>, (usize, Value)> = HashMap::new();

    for outcome in results {
        match outcome {
            ReplicaGetOutcome::Absent => {}
            ReplicaGetOutcome::Tombstone { timestamp } => {
                newest_tombstone = Some(newest_tombstone.map_or(timestamp, |t| t.max(timestamp)));
            }
            ReplicaGetOutcome::Live(value) => {
                let entry = live_votes.entry(value.data.to_vec()).or_insert_with(|| (0, value.clone()));
                entry.0 += 1;
                if value < entry.1 {
                    entry.1 = value;
                }
            }
        }
    }

    let chosen_live = live_votes.into_values().fold(None, |best: Option<(usize, Value)>, (count, value)| {
        match best {
            None => Some((count, value)),
            Some((best_count, best_value)) => {
                if count > best_count || (count == best_count && value < best_value) {
                    Some((count, value))
                } else {
                    Some((best_count, best_value))
                }
            }
        }
    });

    match (chosen_live, newest_tombstone) {
        (Some((_, live)), Some(tombstone_ts)) if tombstone_ts > live.timestamp => None,
        (Some((_, live)), _) => {
            if live.is_expired_at(now) {
                None
            } else {
                Some(live.data)
            }
        }
        (None, _) => None,
    }
}
