use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use transdb_common::{Cell, Record, Value, NEVER_EXPIRES};

use crate::clock::Clock;

/// Ordered persistent map keyed by bytes, values are `Value`. This is the
/// contract the coordinator depends on; an on-disk LSM engine would
/// implement the same trait.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Newest Value present for `key`, or `None`. May be a tombstone or
    /// expired; the caller decides what that means.
    async fn get(&self, key: &[u8]) -> Option<Value>;

    /// Ascending by key from `from_key` inclusive, newest Value per key.
    async fn cell_iterator(&self, from_key: &[u8]) -> Vec<Cell>;

    /// Ascending from `from_key` inclusive to `to_key` exclusive (or to end).
    /// Tombstones and expired Values are filtered out before emission.
    async fn record_iterator(&self, from_key: &[u8], to_key: Option<&[u8]>) -> Vec<Record>;

    /// Writes a new non-tombstone Value for `key`, minting a fresh timestamp.
    async fn upsert(&self, key: &[u8], data: Bytes, expires_at: u64) -> Value;

    /// Writes a tombstone Value for `key`, minting a fresh timestamp.
    async fn remove(&self, key: &[u8]) -> Value;

    /// Writes `value` verbatim, without minting a new timestamp. Used when
    /// persisting a proxied write: the replica must store exactly what the
    /// originator already stamped, not a value of its own minting.
    async fn write_at(&self, key: &[u8], value: Value);

    /// Optional maintenance; may physically drop expired and dominated entries.
    async fn compact(&self, now_millis: u64);

    /// Releases the store; all in-flight writes are durable on return.
    async fn close(&self);
}

/// In-memory `LocalStore` backed by a `BTreeMap`. Ordered by key out of the
/// box, which is what `cell_iterator`/`record_iterator` need — a `HashMap`
/// cannot provide that without an extra sort on every call.
pub struct InMemoryStore {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Value>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { data: Arc::new(RwLock::new(BTreeMap::new())), clock }
    }
}

#[async_trait]
impl LocalStore for InMemoryStore {
    async fn get(&self, key: &[u8]) -> Option<Value> {
        self.data.read().await.get(key).cloned()
    }

    async fn cell_iterator(&self, from_key: &[u8]) -> Vec<Cell> {
        self.data
            .read()
            .await
            .range(from_key.to_vec()..)
            .map(|(k, v)| Cell { key: Bytes::copy_from_slice(k), value: v.clone() })
            .collect()
    }

    async fn record_iterator(&self, from_key: &[u8], to_key: Option<&[u8]>) -> Vec<Record> {
        let now = self.clock.unix_now_millis();
        let guard = self.data.read().await;
        let range: Box<dyn Iterator<Item = (&Vec<u8>, &Value)>> = match to_key {
            Some(to) => Box::new(guard.range(from_key.to_vec()..to.to_vec())),
            None => Box::new(guard.range(from_key.to_vec()..)),
        };
        range
            .filter(|(_, v)| !v.tombstone && !v.is_expired_at(now))
            .map(|(k, v)| Record { key: Bytes::copy_from_slice(k), data: v.data.clone() })
            .collect()
    }

    async fn upsert(&self, key: &[u8], data: Bytes, expires_at: u64) -> Value {
        let value = Value::live(self.clock.unix_now_millis(), expires_at, data);
        self.write_at(key, value.clone()).await;
        value
    }

    async fn remove(&self, key: &[u8]) -> Value {
        let value = Value::tombstone(self.clock.unix_now_millis());
        self.write_at(key, value.clone()).await;
        value
    }

    async fn write_at(&self, key: &[u8], value: Value) {
        let mut guard = self.data.write().await;
        // Last-writer-wins: only replace the stored Value when the incoming one sorts
        // newer-or-equal (the winner is `Ord::min`). Two proxied writes for the same key
        // can race and arrive out of timestamp order; whichever is actually newer must win
        // regardless of which one got here first.
        let should_write = guard.get(key).map_or(true, |existing| value <= *existing);
        if should_write {
            guard.insert(key.to_vec(), value);
        }
    }

    async fn compact(&self, now_millis: u64) {
        let mut guard = self.data.write().await;
        guard.retain(|_, v| !(!v.tombstone && v.expires_at != NEVER_EXPIRES && v.expires_at <= now_millis));
    }

    async fn close(&self) {}
}
