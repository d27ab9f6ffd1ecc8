//! Process-wide registry of active calls, keyed by media stream id

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// Concurrency-safe map from stream id to live call
#[derive(Debug)]
pub struct SessionRegistry<T> {
    inner: Arc<RwLock<HashMap<String, Arc<T>>>>,
}

impl<T> Clone for SessionRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T> SessionRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a call, returning any previous entry for the stream
    pub async fn put(&self, stream_id: &str, call: Arc<T>) -> Option<Arc<T>> {
        self.inner.write().await.insert(stream_id.to_string(), call)
    }

    pub async fn get(&self, stream_id: &str) -> Option<Arc<T>> {
        self.inner.read().await.get(stream_id).cloned()
    }

    pub async fn remove(&self, stream_id: &str) -> Option<Arc<T>> {
        self.inner.write().await.remove(stream_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Snapshot of the live stream ids
    pub async fn stream_ids(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove() {
        let registry: SessionRegistry<String> = SessionRegistry::new();
        assert!(registry.is_empty().await);

        registry.put("MZ1", Arc::new("call-1".to_string())).await;
        registry.put("MZ2", Arc::new("call-2".to_string())).await;
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.get("MZ1").await.as_deref().map(String::as_str), Some("call-1"));

        let removed = registry.remove("MZ1").await;
        assert!(removed.is_some());
        assert!(registry.get("MZ1").await.is_none());
        assert!(registry.remove("MZ1").await.is_none());
        assert_eq!(registry.stream_ids().await, vec!["MZ2".to_string()]);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let registry: SessionRegistry<u32> = SessionRegistry::new();
        let other = registry.clone();
        registry.put("MZ1", Arc::new(7)).await;
        assert_eq!(other.get("MZ1").await.as_deref(), Some(&7));
    }
}
