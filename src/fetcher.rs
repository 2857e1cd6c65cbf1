use std::sync::Arc;

/// Anything that can turn a key (usually an URL) into a page of text.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, key: &str) -> anyhow::Result<String>;
}

#[async_trait::async_trait]
impl<T: Fetcher + ?Sized> Fetcher for &T {
    async fn fetch(&self, key: &str) -> anyhow::Result<String> {
        (**self).fetch(key).await
    }
}

#[async_trait::async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch(&self, key: &str) -> anyhow::Result<String> {
        (**self).fetch(key).await
    }
}
