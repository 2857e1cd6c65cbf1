use crate::cache::{clamp_ttl, TrackStore};
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use moka::Expiry;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
enum Ttl {
    /// Expires after the given duration, counted from the last write.
    Expire(Duration),
    /// Whatever the previous value had, like INCR does. A new key never expires.
    Keep,
}

#[derive(Clone, Debug)]
struct Item {
    value: String,
    ttl: Ttl,
}

struct ItemExpiry;

impl Expiry<String, Item> for ItemExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        item: &Item,
        _created_at: Instant,
    ) -> Option<Duration> {
        match item.ttl {
            Ttl::Expire(ttl) => Some(ttl),
            Ttl::Keep => None,
        }
    }

    fn expire_after_update(
        &self,
        _key: &String,
        item: &Item,
        _updated_at: Instant,
        duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        match item.ttl {
            Ttl::Expire(ttl) => Some(ttl),
            Ttl::Keep => duration_until_expiry,
        }
    }
}

/// Process local [`TrackStore`] on top of a moka cache, expired entries are evicted by moka.
#[derive(Clone)]
pub struct InMemStore {
    cache: Cache<String, Item>,
}

impl Default for InMemStore {
    fn default() -> Self {
        Self {
            cache: Cache::builder().expire_after(ItemExpiry).build(),
        }
    }
}

impl InMemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, after pending evictions have been applied.
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl TrackStore for InMemStore {
    async fn incr(&self, key: &str) -> anyhow::Result<u64> {
        let name = key.to_string();
        let result = self
            .cache
            .entry(key.to_string())
            .and_try_compute_with(|current| async move {
                let count = match current {
                    Some(entry) => {
                        let value = &entry.value().value;
                        value.parse::<u64>().map_err(|_| {
                            anyhow::anyhow!("value of `{name}` is not an integer: {value}")
                        })? + 1
                    }
                    None => 1,
                };
                Ok::<_, anyhow::Error>(Op::Put(Item {
                    value: count.to_string(),
                    ttl: Ttl::Keep,
                }))
            })
            .await?;

        match result {
            CompResult::Inserted(entry) | CompResult::ReplacedWith(entry) => {
                Ok(entry.into_value().value.parse()?)
            }
            _ => anyhow::bail!("counter `{key}` was not written"),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        let item = Item {
            value: value.to_string(),
            ttl: Ttl::Expire(clamp_ttl(ttl)),
        };
        self.cache.insert(key.to_string(), item).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.cache.get(key).await.map(|item| item.value))
    }
}

#[tokio::test]
async fn test_incr_starts_from_zero() {
    let store = InMemStore::new();
    assert_eq!(store.incr("count:a").await.unwrap(), 1);
    assert_eq!(store.incr("count:a").await.unwrap(), 2);
    assert_eq!(store.incr("count:b").await.unwrap(), 1);
    assert_eq!(store.get("count:a").await.unwrap().as_deref(), Some("2"));
}

#[tokio::test]
async fn test_concurrent_incr_is_atomic() {
    let store = InMemStore::new();
    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.incr("count:a").await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(store.get("count:a").await.unwrap().as_deref(), Some("64"));
}

#[tokio::test]
async fn test_incr_on_text_fails() {
    let store = InMemStore::new();
    store
        .set_ex("k", "hello", Duration::from_secs(10))
        .await
        .unwrap();
    assert!(store.incr("k").await.is_err());
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("hello"));
}

#[tokio::test]
async fn test_empty_string_is_not_absent() {
    let store = InMemStore::new();
    assert_eq!(store.get("k").await.unwrap(), None);
    store.set_ex("k", "", Duration::from_secs(10)).await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(String::new()));
}

#[tokio::test]
async fn test_set_ex_expires() {
    let store = InMemStore::new();
    store
        .set_ex("k", "first", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("first"));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(store.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_zero_ttl_lives_one_second() {
    let store = InMemStore::new();
    store.set_ex("k", "v", Duration::ZERO).await.unwrap();
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(store.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_set_ex_resets_expiry() {
    let store = InMemStore::new();
    store
        .set_ex("k", "first", Duration::from_secs(2))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1200)).await;
    store
        .set_ex("k", "second", Duration::from_secs(2))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("second"));
}

#[tokio::test]
async fn test_counters_never_expire() {
    let store = InMemStore::new();
    store.incr("count:a").await.unwrap();
    store
        .set_ex("result:a", "page", Duration::from_secs(1))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(store.get("count:a").await.unwrap().as_deref(), Some("1"));
    assert_eq!(store.get("result:a").await.unwrap(), None);
}

#[tokio::test]
async fn test_expired_entries_are_evicted() {
    let store = InMemStore::new();
    for i in 0..1000 {
        store
            .set_ex(&format!("result:{i}"), "page", Duration::from_secs(1))
            .await
            .unwrap();
    }
    assert_eq!(store.len().await, 1000);

    tokio::time::sleep(Duration::from_secs(3)).await;
    store
        .set_ex("result:fresh", "page", Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(store.len().await, 1);
}
