//! Durable key/value storage for conversation pinnings.
//!
//! Callers work with plain UTF-8 keys and values. Routine failures never
//! cross this boundary as errors:
//!
//! - `get` collapses transport failures, non-2xx responses and missing keys
//!   into `None`. A short store outage therefore looks like an unbound
//!   conversation, at the cost of occasionally creating a duplicate backend
//!   session.
//! - `put` and `delete` report failure as `false`.

pub mod auth;
pub mod config;
pub mod etcd;
pub mod memory;
pub mod metrics_defs;

#[cfg(test)]
mod testutils;

use async_trait::async_trait;
use std::sync::Arc;

pub use config::StoreConfig;
pub use etcd::{EtcdStore, StoreError};
pub use memory::MemoryStore;

#[async_trait]
pub trait AffinityStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if it is missing or unreadable.
    async fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`. Returns whether the write was acknowledged.
    async fn put(&self, key: &str, value: &str) -> bool;

    /// Deletes `key`. Returns whether the delete was acknowledged.
    async fn delete(&self, key: &str) -> bool;
}

/// Builds the store selected in the configuration.
pub fn get_store(config: StoreConfig) -> Arc<dyn AffinityStore> {
    match config {
        StoreConfig::Etcd {
            url,
            username,
            password,
        } => Arc::new(EtcdStore::new(url, username, password)),
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
    }
}
