use std::time::Duration;

const COUNT_PREFIX_KEY: &str = "count";
const RESULT_PREFIX_KEY: &str = "result";

/// The subset of key-value operations needed to count and cache fetches.
///
/// Implementations must make `incr` atomic: concurrent increments on the same key are never lost.
#[async_trait::async_trait]
pub trait TrackStore: Send + Sync {
    /// Increase the integer stored at `key` by one, treating an absent key as zero.
    /// Return the value after increment.
    async fn incr(&self, key: &str) -> anyhow::Result<u64>;

    /// Store `value` at `key`, replacing any previous value and expiry. The key disappears
    /// after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;

    /// Return `None` when the key is absent or expired. An empty string is a valid value.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
}

#[async_trait::async_trait]
impl<T: TrackStore + ?Sized> TrackStore for std::sync::Arc<T> {
    async fn incr(&self, key: &str) -> anyhow::Result<u64> {
        (**self).incr(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        (**self).set_ex(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).get(key).await
    }
}

/// Expiry actually applied by the stores. Redis SETEX counts in whole seconds and refuses
/// zero, every backend follows the same rule.
pub fn clamp_ttl(ttl: Duration) -> Duration {
    Duration::from_secs(ttl.as_secs().max(1))
}

#[inline]
pub fn count_key(key: &str) -> String {
    format!("{COUNT_PREFIX_KEY}:{key}")
}

#[inline]
pub fn result_key(key: &str) -> String {
    format!("{RESULT_PREFIX_KEY}:{key}")
}

#[test]
fn test_key_layout() {
    assert_eq!(count_key("http://example.com"), "count:http://example.com");
    assert_eq!(result_key("http://example.com"), "result:http://example.com");
}

#[test]
fn test_ttl_clamping() {
    assert_eq!(clamp_ttl(Duration::from_secs(10)), Duration::from_secs(10));
    assert_eq!(clamp_ttl(Duration::from_millis(1500)), Duration::from_secs(1));
    assert_eq!(clamp_ttl(Duration::ZERO), Duration::from_secs(1));
}
