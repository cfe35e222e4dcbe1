//! Resumable dictionary scraping behind rotating proxies.
//!
//! [`proxy::ProxyPool`] hands out proxies, [`fetch::RetryingFetcher`] retries one unit of
//! work across them, [`schedule::BatchScheduler`] runs a word list through the fetcher in
//! batches and [`checkpoint::CheckpointStore`] keeps the progress on disk between runs.
//! The site specific extractors live in [`webster`].

pub mod checkpoint;
pub mod cli;
pub mod config;
mod error;
pub mod export;
pub mod fetch;
pub mod job;
pub mod logger;
mod macros;
pub mod proxy;
pub mod schedule;
pub mod webster;
pub mod words;

pub use checkpoint::{Checkpoint, CheckpointStore, WorkResult};
pub use error::{Error, Result};
pub use fetch::{Extract, ExtractError, FetchError, Fetched, RetryingFetcher};
pub use proxy::{Proxy, ProxyPool};
pub use schedule::{BatchScheduler, RunReport, Shutdown};

pub const DICTIONARY_HOME: &str = "https://www.merriam-webster.com";
pub const AUDIO_BASE_URL: &str = "https://media.merriam-webster.com/audio/prons/en/us/mp3";

const WORKERS: usize = 20;
const BATCH_SIZE: usize = 10;
const CHECKPOINT_EVERY: usize = 5;
const MAX_ATTEMPTS: usize = 5;
const PROXY_COOLDOWN_MS: u64 = 200;
/// Slept before each request attempt, `(min, max)` in ms.
const FETCH_JITTER_MS: (u64, u64) = (500, 1500);
/// Slept after a transient failure.
const FETCH_BACKOFF_MS: (u64, u64) = (1000, 2000);
/// Slept between two batches.
const BATCH_PAUSE_MS: (u64, u64) = (2000, 5000);
