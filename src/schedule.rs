use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Local;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    sync::{watch, Semaphore},
    task::JoinSet,
};

use crate::checkpoint::{Checkpoint, CheckpointStore, WorkResult};
use crate::config::BatchConfig;
use crate::fetch::{Extract, Fetched, RetryingFetcher};
use crate::{info_time, Result};

/// Cooperative stop signal for a run, usually fed by Ctrl-C.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (watch::Sender<bool>, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (tx, Shutdown { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Shutdown {
        let (_tx, rx) = watch::channel(false);
        Shutdown { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires. Pends forever if the sender is gone without firing.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Fires `stop_tx` on the first interrupt from `interrupt`, then waits for another one.
/// Returns `true` when a second interrupt arrives and `false` if listening fails.
pub async fn forward_interrupts<F, Fut>(mut interrupt: F, stop_tx: watch::Sender<bool>) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    log::warn!("Interrupt received, saving a checkpoint. Press Ctrl-C again to quit now.");
    let _ = stop_tx.send(true);
    interrupt().await.is_ok()
}

/// Splits `items` into consecutive batches of `batch_size` (at least 1), preserving order.
pub fn partition<T>(items: &[T], batch_size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(batch_size.max(1))
}

/// What a run did. `checkpoint` holds every result, resumed ones included.
#[derive(Debug)]
pub struct RunReport<T> {
    pub checkpoint: Checkpoint<T>,
    pub skipped: usize,
    pub found: usize,
    pub not_found: usize,
    pub failed: Vec<String>,
    pub batches: usize,
    pub interrupted: bool,
}

impl<T> RunReport<T> {
    pub fn processed(&self) -> usize {
        self.found + self.not_found
    }
}

struct BatchOutcome<T> {
    results: Vec<WorkResult<T>>,
    failed: Vec<String>,
    panicked: usize,
    interrupted: bool,
}

/// Drives a list of work items through a [`RetryingFetcher`] in checkpointed batches.
pub struct BatchScheduler<E: Extract> {
    fetcher: Arc<RetryingFetcher>,
    extractor: Arc<E>,
    store: CheckpointStore,
    key: String,
    config: BatchConfig,
}

impl<E> BatchScheduler<E>
where
    E: Extract,
    E::Output: Serialize + DeserializeOwned,
{
    pub fn new(
        fetcher: Arc<RetryingFetcher>,
        extractor: Arc<E>,
        store: CheckpointStore,
        key: impl Into<String>,
        config: BatchConfig,
    ) -> Self {
        BatchScheduler {
            fetcher,
            extractor,
            store,
            key: key.into(),
            config,
        }
    }

    /// Processes `items`, skipping whatever the stored checkpoint already covers when resuming.
    ///
    /// Item failures are counted and never abort the run. Only checkpoint storage errors do.
    /// When `shutdown` fires the current batch is abandoned, finished items are kept and a
    /// final checkpoint is written.
    pub async fn run(
        &self,
        items: Vec<String>,
        mut shutdown: Shutdown,
    ) -> Result<RunReport<E::Output>> {
        let start_time = Local::now();
        let mut checkpoint: Checkpoint<E::Output> = if self.config.resume {
            self.store.load(&self.key).await.unwrap_or_default()
        } else {
            Checkpoint::default()
        };

        let total = items.len();
        let mut seen = HashSet::with_capacity(total);
        let pending: Vec<String> = items
            .into_iter()
            .filter(|item| !checkpoint.is_complete(item) && seen.insert(item.clone()))
            .collect();

        let batch_size = self.config.batch_size.max(1);
        let checkpoint_every = self.config.checkpoint_every.max(1);
        let total_batches = pending.len().div_ceil(batch_size);
        info_time!(
            "Processing {} items in {total_batches} batches ({} skipped, {} workers, batch size {batch_size})",
            pending.len(),
            total - pending.len(),
            self.config.workers.max(1)
        );

        let mut report = RunReport {
            checkpoint: Checkpoint::default(),
            skipped: total - pending.len(),
            found: 0,
            not_found: 0,
            failed: Vec::new(),
            batches: 0,
            interrupted: false,
        };

        for (idx, batch) in partition(&pending, batch_size).enumerate() {
            let batch_num = idx + 1;
            if idx > 0 && !self.config.pause.is_zero() {
                tokio::select! {
                    _ = self.config.pause.sleep() => {}
                    _ = shutdown.triggered() => {
                        report.interrupted = true;
                        break;
                    }
                }
            }
            if shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }

            let batch_start = Local::now();
            let outcome = self.run_batch(batch, &mut shutdown).await;

            for result in outcome.results {
                if result.payload.is_some() {
                    report.found += 1;
                } else {
                    report.not_found += 1;
                }
                checkpoint.record(result);
            }
            let failed_now = outcome.failed.len() + outcome.panicked;
            report.failed.extend(outcome.failed);
            report.batches = batch_num;

            if outcome.interrupted {
                report.interrupted = true;
                break;
            }

            info_time!(
                batch_start,
                "Batch {batch_num}/{total_batches}: {} completed, {failed_now} failed, {} processed overall, {} proxies healthy",
                batch.len().saturating_sub(failed_now),
                checkpoint.len(),
                self.fetcher.pool().healthy_count()
            );

            if batch_num % checkpoint_every == 0 || batch_num == total_batches {
                checkpoint.touch();
                self.store.save(&self.key, &checkpoint).await?;
            }
        }

        if report.interrupted {
            info_time!("Interrupted, saving final checkpoint");
            checkpoint.touch();
            self.store.save(&self.key, &checkpoint).await?;
        }

        info_time!(
            start_time,
            "Run '{}' finished: {} found, {} not found, {} failed, {} skipped",
            self.key,
            report.found,
            report.not_found,
            report.failed.len(),
            report.skipped
        );
        report.checkpoint = checkpoint;
        Ok(report)
    }

    /// Runs one batch with at most `workers` fetches in flight and waits for all of them,
    /// or for `shutdown`, whichever comes first.
    async fn run_batch(&self, batch: &[String], shutdown: &mut Shutdown) -> BatchOutcome<E::Output> {
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut task_set = JoinSet::new();
        for item in batch {
            task_set.spawn({
                let item = item.clone();
                let fetcher = Arc::clone(&self.fetcher);
                let extractor = Arc::clone(&self.extractor);
                let permits = Arc::clone(&permits);

                async move {
                    let _permit = permits.acquire_owned().await.ok();
                    let outcome = fetcher.fetch(&item, extractor.as_ref()).await;
                    (item, outcome)
                }
            });
        }

        let mut outcome = BatchOutcome {
            results: Vec::with_capacity(batch.len()),
            failed: Vec::new(),
            panicked: 0,
            interrupted: false,
        };
        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    task_set.abort_all();
                    outcome.interrupted = true;
                    break;
                }
                joined = task_set.join_next() => match joined {
                    None => break,
                    Some(Ok((item, Ok(fetched)))) => {
                        let payload = match fetched {
                            Fetched::Found(payload) => Some(payload),
                            Fetched::NotFound => None,
                        };
                        outcome.results.push(WorkResult::new(item, payload));
                    }
                    Some(Ok((_, Err(e)))) => {
                        log::warn!("{e}");
                        outcome.failed.push(e.item);
                    }
                    Some(Err(e)) => {
                        log::error!("Worker task died: {e}");
                        outcome.panicked += 1;
                    }
                },
            }
        }
        outcome
    }
}
