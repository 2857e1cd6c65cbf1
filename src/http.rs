use anyhow::Context;
use std::ops::Deref;
use std::time::Duration;

use crate::fetcher::Fetcher;

pub struct HttpClient(reqwest::Client);

impl Default for HttpClient {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(30)).expect("fail to build default http client")
    }
}

impl Deref for HttpClient {
    type Target = reqwest::Client;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "fail to build http client")?;
        Ok(Self(inner))
    }

    #[inline]
    pub fn inner(&self) -> &reqwest::Client {
        &self.0
    }
}

/// Plain GET. The body is returned whatever the status code is, only transport errors fail.
#[async_trait::async_trait]
impl Fetcher for HttpClient {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        self.get(url)
            .send()
            .await
            .with_context(|| format!("fail to send GET request to url: `{}`", url))?
            .text()
            .await
            .with_context(|| format!("fail to read response body from url: `{}`", url))
    }
}

#[tokio::test]
async fn test_unreachable_url_is_an_error() {
    let client = HttpClient::with_timeout(Duration::from_secs(2)).unwrap();
    let err = client.fetch("http://127.0.0.1:1/").await.unwrap_err();
    assert!(err.to_string().contains("http://127.0.0.1:1/"));
}

#[tokio::test]
async fn test_invalid_url_is_an_error() {
    let client = HttpClient::new();
    assert!(client.fetch("not a url").await.is_err());
}

#[tokio::test]
#[ignore = "requires network access"]
async fn test_fetch_example_page() {
    let page = HttpClient::new().fetch("http://example.com").await.unwrap();
    assert!(page.contains("Example Domain"));
}
