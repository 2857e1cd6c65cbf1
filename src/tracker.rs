use crate::cache::{count_key, result_key, TrackStore};
use crate::fetcher::Fetcher;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// How long a fetched page stays in the store.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Count every access to a key and cache the fetched page for a short while.
///
/// The access counter under `count:<key>` is increased before anything else, so it also counts
/// cache hits and fetches that end up failing. Only successful fetches are written to
/// `result:<key>`, with an expiry of `ttl`.
#[derive(TypedBuilder)]
pub struct CachedFetcher<S, F>
where
    S: TrackStore,
    F: Fetcher,
{
    store: S,
    inner: F,
    #[builder(default = DEFAULT_TTL)]
    ttl: Duration,
}

impl<S, F> CachedFetcher<S, F>
where
    S: TrackStore,
    F: Fetcher,
{
    pub fn new(store: S, inner: F) -> Self {
        Self::builder().store(store).inner(inner).build()
    }

    /// Number of accesses recorded for `key`, zero if it was never fetched.
    pub async fn hits(&self, key: &str) -> anyhow::Result<u64> {
        let Some(count) = self.store.get(&count_key(key)).await? else {
            return Ok(0);
        };
        count
            .parse()
            .map_err(|_| anyhow::anyhow!("access counter of `{key}` is not an integer: {count}"))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[async_trait::async_trait]
impl<S, F> Fetcher for CachedFetcher<S, F>
where
    S: TrackStore,
    F: Fetcher,
{
    async fn fetch(&self, key: &str) -> anyhow::Result<String> {
        let count = self.store.incr(&count_key(key)).await?;

        let result_key = result_key(key);
        if let Some(cached) = self.store.get(&result_key).await? {
            tracing::debug!("cache hit for `{key}`, {count} accesses so far");
            return Ok(cached);
        }

        tracing::debug!("cache miss for `{key}`, {count} accesses so far");
        let page = self.inner.fetch(key).await?;
        self.store.set_ex(&result_key, &page, self.ttl).await?;

        Ok(page)
    }
}

#[cfg(test)]
use crate::memory::InMemStore;
#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(test)]
use std::sync::Arc;

/// Serves fixed pages and fails on anything else, counting every call.
#[cfg(test)]
#[derive(Default)]
struct MockFetcher {
    pages: HashMap<String, String>,
    calls: AtomicUsize,
}

#[cfg(test)]
impl MockFetcher {
    fn with_page(mut self, key: &str, page: &str) -> Self {
        self.pages.insert(key.to_string(), page.to_string());
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, key: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(key) {
            Some(page) => Ok(page.clone()),
            None => anyhow::bail!("unreachable resource: {key}"),
        }
    }
}

/// An [`InMemStore`] whose writes can be made to fail.
#[cfg(test)]
#[derive(Default)]
struct FlakyStore {
    inner: InMemStore,
    fail_incr: bool,
    fail_set_ex: bool,
}

#[cfg(test)]
#[async_trait::async_trait]
impl TrackStore for FlakyStore {
    async fn incr(&self, key: &str) -> anyhow::Result<u64> {
        if self.fail_incr {
            anyhow::bail!("store unavailable: incr {key}");
        }
        self.inner.incr(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        if self.fail_set_ex {
            anyhow::bail!("store unavailable: setex {key}");
        }
        self.inner.set_ex(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key).await
    }
}

#[cfg(test)]
type Tracked = CachedFetcher<InMemStore, Arc<MockFetcher>>;

#[cfg(test)]
fn setup(inner: MockFetcher) -> (Tracked, Arc<MockFetcher>) {
    let inner = Arc::new(inner);
    let fetcher = CachedFetcher::new(InMemStore::new(), Arc::clone(&inner));
    (fetcher, inner)
}

#[tokio::test]
async fn test_first_fetch_counts_once() {
    let (fetcher, inner) = setup(MockFetcher::default().with_page("A", "hello"));

    assert_eq!(fetcher.fetch("A").await.unwrap(), "hello");
    assert_eq!(fetcher.hits("A").await.unwrap(), 1);
    assert_eq!(inner.calls(), 1);
}

#[tokio::test]
async fn test_second_fetch_hits_cache() {
    let (fetcher, inner) = setup(MockFetcher::default().with_page("A", "hello"));

    let first = fetcher.fetch("A").await.unwrap();
    let second = fetcher.fetch("A").await.unwrap();

    assert_eq!(first, "hello");
    assert_eq!(first, second);
    assert_eq!(fetcher.hits("A").await.unwrap(), 2);
    assert_eq!(inner.calls(), 1);
}

#[tokio::test]
async fn test_fetch_again_after_expiry() {
    let inner = Arc::new(MockFetcher::default().with_page("A", "hello"));
    let fetcher = CachedFetcher::builder()
        .store(InMemStore::new())
        .inner(Arc::clone(&inner))
        .ttl(Duration::from_secs(1))
        .build();
    assert_eq!(fetcher.ttl(), Duration::from_secs(1));

    fetcher.fetch("A").await.unwrap();
    fetcher.fetch("A").await.unwrap();
    assert_eq!(inner.calls(), 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(fetcher.fetch("A").await.unwrap(), "hello");
    assert_eq!(inner.calls(), 2);
    assert_eq!(fetcher.hits("A").await.unwrap(), 3);
}

#[tokio::test]
async fn test_cache_hit_keeps_expiry() {
    let inner = Arc::new(MockFetcher::default().with_page("A", "hello"));
    let fetcher = CachedFetcher::builder()
        .store(InMemStore::new())
        .inner(Arc::clone(&inner))
        .ttl(Duration::from_secs(2))
        .build();

    fetcher.fetch("A").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    fetcher.fetch("A").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    fetcher.fetch("A").await.unwrap();

    assert_eq!(inner.calls(), 2);
}

#[tokio::test]
async fn test_zero_ttl_still_caches() {
    let inner = Arc::new(MockFetcher::default().with_page("A", "hello"));
    let fetcher = CachedFetcher::builder()
        .store(InMemStore::new())
        .inner(Arc::clone(&inner))
        .ttl(Duration::ZERO)
        .build();

    fetcher.fetch("A").await.unwrap();
    fetcher.fetch("A").await.unwrap();

    assert_eq!(inner.calls(), 1);
}

#[tokio::test]
async fn test_keys_are_independent() {
    let (fetcher, inner) = setup(
        MockFetcher::default()
            .with_page("A", "hello")
            .with_page("C", "world"),
    );

    fetcher.fetch("A").await.unwrap();
    assert_eq!(fetcher.fetch("C").await.unwrap(), "world");
    fetcher.fetch("C").await.unwrap();

    assert_eq!(fetcher.hits("A").await.unwrap(), 1);
    assert_eq!(fetcher.hits("C").await.unwrap(), 2);
    assert_eq!(fetcher.hits("never-seen").await.unwrap(), 0);
    assert_eq!(inner.calls(), 2);
}

#[tokio::test]
async fn test_failed_fetch_still_counts() {
    let (fetcher, inner) = setup(MockFetcher::default());

    let err = fetcher.fetch("B").await.unwrap_err();
    assert_eq!(err.to_string(), "unreachable resource: B");
    assert_eq!(fetcher.hits("B").await.unwrap(), 1);
    assert_eq!(fetcher.store().get(&result_key("B")).await.unwrap(), None);

    assert!(fetcher.fetch("B").await.is_err());
    assert_eq!(fetcher.hits("B").await.unwrap(), 2);
    assert_eq!(inner.calls(), 2);
}

#[tokio::test]
async fn test_failed_incr_skips_fetch() {
    let inner = Arc::new(MockFetcher::default().with_page("A", "hello"));
    let store = FlakyStore {
        fail_incr: true,
        ..Default::default()
    };
    let fetcher = CachedFetcher::new(store, Arc::clone(&inner));

    let err = fetcher.fetch("A").await.unwrap_err();
    assert_eq!(err.to_string(), "store unavailable: incr count:A");
    assert_eq!(inner.calls(), 0);
    assert_eq!(fetcher.hits("A").await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_set_ex_keeps_count() {
    let inner = Arc::new(MockFetcher::default().with_page("A", "hello"));
    let store = FlakyStore {
        fail_set_ex: true,
        ..Default::default()
    };
    let fetcher = CachedFetcher::new(store, Arc::clone(&inner));

    let err = fetcher.fetch("A").await.unwrap_err();
    assert_eq!(err.to_string(), "store unavailable: setex result:A");
    assert_eq!(inner.calls(), 1);
    assert_eq!(fetcher.hits("A").await.unwrap(), 1);
    assert_eq!(fetcher.store().get(&result_key("A")).await.unwrap(), None);
}

#[tokio::test]
async fn test_empty_page_is_cached() {
    let (fetcher, inner) = setup(MockFetcher::default().with_page("E", ""));

    assert_eq!(fetcher.fetch("E").await.unwrap(), "");
    assert_eq!(fetcher.fetch("E").await.unwrap(), "");
    assert_eq!(inner.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_access_never_loses_counts() {
    let (fetcher, _inner) = setup(MockFetcher::default().with_page("A", "hello"));
    let fetcher = Arc::new(fetcher);

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let fetcher = Arc::clone(&fetcher);
            tokio::spawn(async move { fetcher.fetch("A").await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "hello");
    }

    assert_eq!(fetcher.hits("A").await.unwrap(), 32);
}
