// Data Module
pub mod cache;
pub mod memory;
pub mod redis;

// Provider Module
pub mod fetcher;
#[cfg(feature = "reqwest")]
pub mod http;

pub mod config;
pub mod tracker;

pub use fetcher::Fetcher;
pub use tracker::{CachedFetcher, DEFAULT_TTL};
