use anyhow::Context;
use rusty_cacher::{config::Config, http::HttpClient, CachedFetcher, Fetcher};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_path_if_exists()?;
    let log_level = config
        .as_ref()
        .map(|cfg| cfg.log_level.clone())
        .unwrap_or_else(|| "INFO".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    let config = match config {
        Some(config) => config,
        None => {
            tracing::warn!("no config file found, fallback to default config");
            Config::default()
        }
    };

    let url = std::env::args()
        .nth(1)
        .with_context(|| "usage: get-page <url>")?;

    run(&config, &url).await
}

async fn run(config: &Config, url: &str) -> anyhow::Result<()> {
    let store = rusty_cacher::redis::connect(&config.redis_addr).await?;
    tracing::info!("connected to redis at {}", config.redis_addr);

    let fetcher = CachedFetcher::builder()
        .store(store)
        .inner(HttpClient::with_timeout(config.http_timeout())?)
        .ttl(config.cache_ttl())
        .build();

    // first call goes to the network, the second one is served from redis
    println!("{}", fetcher.fetch(url).await?);
    println!("{}", fetcher.fetch(url).await?);
    println!("{}", fetcher.hits(url).await?);

    Ok(())
}
