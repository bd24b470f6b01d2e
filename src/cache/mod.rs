use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 缓存后端抽象：`get` / `insert` / `remove`，可替换实现。
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Send + Sync + 'static;
    type Value: Send + Sync + 'static;

    async fn get(&self, key: &Self::Key) -> Option<Arc<Self::Value>>;

    async fn insert(&self, key: Self::Key, value: Arc<Self::Value>);

    async fn remove(&self, key: &Self::Key);
}

/// 读穿缓存，附带 per-key 锁：读侧用于合并回源，写侧用于单写者串行化。
pub struct Cache<B>
where
    B: CacheBackend,
{
    backend: B,
    locks: DashMap<B::Key, Arc<Mutex<()>>>,
}

impl<B> Default for Cache<B>
where
    B: CacheBackend + Default,
{
    fn default() -> Self {
        Self::new(B::default())
    }
}

impl<B> Cache<B>
where
    B: CacheBackend,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            locks: DashMap::new(),
        }
    }

    pub async fn get(&self, key: &B::Key) -> Option<Arc<B::Value>> {
        self.backend.get(key).await
    }

    fn key_lock(&self, key: &B::Key) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 命中直接返回；未命中时持 key 锁回源，同 key 的并发读只回源一次。
    pub async fn load_or_fetch<F, Fut, E>(&self, key: B::Key, fetcher: F) -> Result<Arc<B::Value>, E>
    where
        F: FnOnce(&B::Key) -> Fut + Send,
        Fut: Future<Output = Result<B::Value, E>> + Send,
    {
        if let Some(hit) = self.backend.get(&key).await {
            return Ok(hit);
        }

        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        if let Some(hit) = self.backend.get(&key).await {
            return Ok(hit);
        }

        let value = Arc::new(fetcher(&key).await?);
        self.backend.insert(key, value.clone()).await;
        Ok(value)
    }

    /// 独占 key 锁；持有期间该 key 的回源与其它写者都会等待。
    pub async fn lock_for_write(&self, key: &B::Key) -> OwnedMutexGuard<()> {
        self.key_lock(key).lock_owned().await
    }

    pub async fn invalidate(&self, key: &B::Key) {
        self.backend.remove(key).await;
    }
}

/// 默认内存后端：DashMap + Arc。
pub struct InMemoryBackend<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    entries: DashMap<K, Arc<V>>,
}

impl<K, V> Default for InMemoryBackend<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl<K, V> CacheBackend for InMemoryBackend<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    async fn get(&self, key: &Self::Key) -> Option<Arc<Self::Value>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    async fn insert(&self, key: Self::Key, value: Arc<Self::Value>) {
        self.entries.insert(key, value);
    }

    async fn remove(&self, key: &Self::Key) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn fetch_runs_once_until_invalidated() {
        let cache: Cache<InMemoryBackend<String, u64>> = Cache::default();
        let fetches = AtomicU32::new(0);
        let fetch = |_: &String| {
            fetches.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, std::io::Error>(7u64) }
        };

        let first = cache.load_or_fetch("k".to_string(), fetch).await.expect("fetch");
        let second = cache.load_or_fetch("k".to_string(), fetch).await.expect("fetch");
        assert_eq!((*first, *second), (7, 7));
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        cache.invalidate(&"k".to_string()).await;
        cache.load_or_fetch("k".to_string(), fetch).await.expect("fetch");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_error_is_not_cached() {
        let cache: Cache<InMemoryBackend<String, u64>> = Cache::default();
        let result = cache
            .load_or_fetch("k".to_string(), |_| async {
                Err::<u64, _>(std::io::Error::other("boom"))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.get(&"k".to_string()).await.is_none());
    }
}
