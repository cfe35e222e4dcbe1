use std::path::PathBuf;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::checkpoint::CheckpointStore;
use crate::config::{BatchConfig, PoolConfig, RetryPolicy};
use crate::fetch::{Extract, RetryingFetcher};
use crate::proxy::{load_proxy_addresses, ProxyPool};
use crate::schedule::{BatchScheduler, RunReport, Shutdown};
use crate::Result;

/// Everything a checkpointed scrape needs besides its extractor and items.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub proxies: PathBuf,
    pub state_dir: PathBuf,
    pub key: String,
    pub pool: PoolConfig,
    pub retry: RetryPolicy,
    pub batch: BatchConfig,
    pub keep_checkpoint: bool,
}

impl JobOptions {
    pub fn store(&self) -> CheckpointStore {
        CheckpointStore::new(&self.state_dir)
    }

    /// Base path for final outputs, e.g. `<state_dir>/<key>`.
    pub fn output_base(&self) -> PathBuf {
        self.state_dir.join(&self.key)
    }
}

/// Builds the proxy pool and fetcher described by `opts`.
/// Fails with [`crate::Error::EmptyPool`] when the proxy source has nothing usable.
pub async fn build_fetcher(opts: &JobOptions) -> Result<Arc<RetryingFetcher>> {
    let addresses = load_proxy_addresses(&opts.proxies).await?;
    let pool = ProxyPool::new(addresses, &opts.pool)?;
    log::info!("Loaded {} proxies from {}", pool.len(), opts.proxies.display());
    Ok(Arc::new(RetryingFetcher::new(Arc::new(pool), opts.retry.clone())))
}

/// Runs `items` through `extractor` with checkpointing.
pub async fn run_job<E>(
    opts: &JobOptions,
    fetcher: Arc<RetryingFetcher>,
    extractor: E,
    items: Vec<String>,
    shutdown: Shutdown,
) -> Result<RunReport<E::Output>>
where
    E: Extract,
    E::Output: Serialize + DeserializeOwned,
{
    let scheduler = BatchScheduler::new(
        fetcher,
        Arc::new(extractor),
        opts.store(),
        opts.key.clone(),
        opts.batch.clone(),
    );
    scheduler.run(items, shutdown).await
}

/// Drops the checkpoint of a run whose outputs have been written, unless told to keep it.
/// Interrupted runs always keep theirs.
pub async fn finish_job<T>(opts: &JobOptions, report: &RunReport<T>) -> Result<()> {
    if report.interrupted {
        log::info!(
            "Run interrupted. Progress is saved in {}, rerun with --resume to continue.",
            opts.store().checkpoint_path(&opts.key).display()
        );
        return Ok(());
    }
    if !report.failed.is_empty() {
        log::warn!(
            "{} items failed: {}",
            report.failed.len(),
            report.failed.join(", ")
        );
    }
    if opts.keep_checkpoint {
        return Ok(());
    }
    opts.store().clear(&opts.key).await
}
