use crate::cache::{clamp_ttl, TrackStore};
use anyhow::Context;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;

/// Open a client at `addr` and build a reconnecting connection manager on top of it.
pub async fn connect(addr: &str) -> anyhow::Result<ConnectionManager> {
    let client =
        redis::Client::open(addr).with_context(|| format!("fail to open redis client at {addr}"))?;
    client
        .get_connection_manager()
        .await
        .with_context(|| format!("fail to connect to redis at {addr}"))
}

// Every call works on its own clone of the manager, clones share one multiplexed connection.
// Command methods are called fully qualified since `AsyncCommands` uses the same names.
#[async_trait::async_trait]
impl TrackStore for ConnectionManager {
    async fn incr(&self, key: &str) -> anyhow::Result<u64> {
        let mut conn = self.clone();
        let count: u64 = AsyncCommands::incr(&mut conn, key, 1)
            .await
            .with_context(|| format!("fail to make incr request to redis for `{key}`"))?;
        Ok(count)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.clone();
        let () = AsyncCommands::set_ex(&mut conn, key, value, clamp_ttl(ttl).as_secs())
            .await
            .with_context(|| format!("fail to make setex request to redis for `{key}`"))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.clone();
        let value: Option<String> = AsyncCommands::get(&mut conn, key)
            .await
            .with_context(|| format!("fail to make get request to redis for `{key}`"))?;
        Ok(value)
    }
}

#[tokio::test]
#[ignore = "requires a running redis, set REDIS_ADDR"]
async fn test_redis_track_store() {
    dotenvy::dotenv().ok();
    let addr = std::env::var("REDIS_ADDR").unwrap_or_else(|_| "redis://localhost:6379".into());
    let conn = connect(&addr).await.unwrap();

    let key = format!("rusty-cacher-test-{}", std::process::id());
    let mut raw = conn.clone();
    let _: () = raw.del(&key).await.unwrap();

    assert_eq!(conn.get(&key).await.unwrap(), None);
    assert_eq!(conn.incr(&key).await.unwrap(), 1);
    assert_eq!(conn.incr(&key).await.unwrap(), 2);

    let cached = format!("{key}-result");
    conn.set_ex(&cached, "", Duration::from_secs(1)).await.unwrap();
    assert_eq!(conn.get(&cached).await.unwrap(), Some(String::new()));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(conn.get(&cached).await.unwrap(), None);

    let _: () = raw.del(&key).await.unwrap();
}
