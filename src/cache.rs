//! Fast flow-identity cache
//!
//! The fast cache is a performance optimization, not the source of truth:
//! a missing or expired entry is always reconstructable from durable
//! storage. The [`FastCache`] trait keeps the pipeline independent of the
//! concrete store so a networked cache can be swapped in.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::PrepResult;

/// Keyed value store with per-entry TTL
#[async_trait]
pub trait FastCache: Send + Sync {
    /// Look up a value; `None` on miss or expiry
    async fn get(&self, key: &str) -> PrepResult<Option<String>>;

    /// Store a value, replacing any existing entry and resetting its TTL
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> PrepResult<()>;
}

/// In-process [`FastCache`] with lazy expiry
#[derive(Default)]
pub struct InMemoryCache {
    inner: RwLock<HashMap<String, Entry>>,
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl InMemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FastCache for InMemoryCache {
    async fn get(&self, key: &str) -> PrepResult<Option<String>> {
        let mut inner = self.inner.write().await;
        match inner.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                inner.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> PrepResult<()> {
        let mut inner = self.inner.write().await;
        inner.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}
