use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use webster_scrape::checkpoint::CheckpointStore;
use webster_scrape::config::{BatchConfig, DelayRange, PoolConfig, RetryPolicy};
use webster_scrape::{BatchScheduler, Extract, ExtractError, Proxy, ProxyPool, RetryingFetcher};

pub fn words(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("w{i}")).collect()
}

pub fn fetcher(proxies: usize, max_attempts: usize) -> Arc<RetryingFetcher> {
    let config = PoolConfig {
        cooldown: Duration::ZERO,
    };
    let pool = ProxyPool::new((0..proxies).map(|i| format!("10.0.0.{i}:8080")), &config).unwrap();
    Arc::new(RetryingFetcher::new(
        Arc::new(pool),
        RetryPolicy::immediate(max_attempts),
    ))
}

pub fn batch_config(workers: usize, batch_size: usize, checkpoint_every: usize) -> BatchConfig {
    BatchConfig {
        workers,
        batch_size,
        checkpoint_every,
        pause: DelayRange::ZERO,
        resume: true,
    }
}

pub fn scheduler<E: Extract>(
    dir: &Path,
    extractor: Arc<E>,
    config: BatchConfig,
) -> BatchScheduler<E>
where
    E::Output: serde::Serialize + serde::de::DeserializeOwned,
{
    BatchScheduler::new(
        fetcher(4, 3),
        extractor,
        CheckpointStore::new(dir),
        "test_run",
        config,
    )
}

/// How a [`Recorder`] answers for one word.
#[derive(Clone, Copy)]
pub enum Behaviour {
    Define,
    Missing,
    AlwaysTransient,
    Slow(Duration),
}

/// Counts calls per word and answers according to a per-word behaviour map.
#[derive(Default)]
pub struct Recorder {
    pub behaviour: HashMap<String, Behaviour>,
    pub calls: Mutex<HashMap<String, usize>>,
    pub total: AtomicUsize,
}

impl Recorder {
    pub fn with(behaviour: &[(&str, Behaviour)]) -> Self {
        Recorder {
            behaviour: behaviour
                .iter()
                .map(|(w, b)| (w.to_string(), *b))
                .collect(),
            ..Recorder::default()
        }
    }

    pub fn calls_for(&self, word: &str) -> usize {
        self.calls.lock().unwrap().get(word).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl Extract for Recorder {
    type Output = String;

    async fn extract(&self, item: &str, _proxy: &Proxy) -> Result<String, ExtractError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(item.to_string()).or_default() += 1;

        match self.behaviour.get(item).copied().unwrap_or(Behaviour::Define) {
            Behaviour::Define => Ok(format!("definition of {item}")),
            Behaviour::Missing => Err(ExtractError::NotFound),
            Behaviour::AlwaysTransient => Err(ExtractError::Transient("HTTP 503".into())),
            Behaviour::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(format!("definition of {item}"))
            }
        }
    }
}
