//! Durable progress for resumable runs.
//!
//! A checkpoint lives in two files next to each other:
//! `<key>_checkpoint.json` holds the processed identifiers and a timestamp,
//! `<key>_results.json` holds the accumulated results. Both are replaced atomically.

use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use tokio::io::AsyncWriteExt;

use crate::{Error, Result};

/// Output of one completed work item. `payload` is `None` when the item has no data.
///
/// On disk a missing payload is an absent `payload` key, so payloads that serialize to
/// `null` (`()`, `Option`) still load back as found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct WorkResult<T> {
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "present")]
    pub payload: Option<T>,
    pub completed_at: DateTime<Utc>,
}

/// `Some(v)` is stored as `v` and any stored value loads as `Some`.
/// Paired with `skip_serializing_if` + `default` for the `None` case.
mod present {
    use super::*;

    pub fn serialize<T: Serialize, S: Serializer>(
        payload: &Option<T>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match payload {
            Some(value) => value.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<T>, D::Error> {
        T::deserialize(deserializer).map(Some)
    }
}

impl<T> WorkResult<T> {
    pub fn new(word: impl Into<String>, payload: Option<T>) -> Self {
        WorkResult {
            word: word.into(),
            payload,
            completed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint<T> {
    completed: BTreeSet<String>,
    results: Vec<WorkResult<T>>,
    pub last_updated: DateTime<Utc>,
}

impl<T> Default for Checkpoint<T> {
    fn default() -> Self {
        Checkpoint {
            completed: BTreeSet::new(),
            results: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl<T> Checkpoint<T> {
    pub fn is_complete(&self, word: &str) -> bool {
        self.completed.contains(word)
    }

    /// Records a finished item. Recording the same identifier again replaces its result.
    pub fn record(&mut self, result: WorkResult<T>) {
        if self.completed.insert(result.word.clone()) {
            self.results.push(result);
        } else if let Some(existing) = self.results.iter_mut().find(|r| r.word == result.word) {
            *existing = result;
        } else {
            self.results.push(result);
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn completed(&self) -> &BTreeSet<String> {
        &self.completed
    }

    pub fn results(&self) -> &[WorkResult<T>] {
        &self.results
    }

    /// Results ordered by the position of their word in `items`. Words not in `items`
    /// go last, in completion order.
    pub fn results_in_order(&self, items: &[String]) -> Vec<&WorkResult<T>> {
        let position: HashMap<&str, usize> = items
            .iter()
            .enumerate()
            .rev()
            .map(|(idx, item)| (item.as_str(), idx))
            .collect();
        let mut ordered: Vec<_> = self.results.iter().collect();
        ordered.sort_by_key(|r| position.get(r.word.as_str()).copied().unwrap_or(usize::MAX));
        ordered
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct CheckpointFile {
    words_processed: Vec<String>,
    last_updated: DateTime<Utc>,
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `bytes` to a temp file beside `path`, syncs it and renames it over `path`.
/// The previous content survives an interrupted write. Every call gets its own temp file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("checkpoint");
    let tmp_path = path.with_file_name(format!(
        ".{file_name}.tmp-{}-{}",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let write = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        tokio::fs::rename(&tmp_path, path).await
    };
    if let Err(e) = write.await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::storage(path, e));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CheckpointStore { dir: dir.into() }
    }

    pub fn checkpoint_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}_checkpoint.json"))
    }

    pub fn results_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}_results.json"))
    }

    /// Returns the last saved checkpoint for `key`.
    /// Missing, unreadable or malformed files all mean "start fresh".
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<Checkpoint<T>> {
        let checkpoint_path = self.checkpoint_path(key);
        let raw = match tokio::fs::read_to_string(&checkpoint_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No checkpoint found at {}. Starting fresh.", checkpoint_path.display());
                return None;
            }
            Err(e) => {
                log::error!("Failed to read checkpoint {}: {e}", checkpoint_path.display());
                return None;
            }
        };
        let file: CheckpointFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                log::error!("Failed to parse checkpoint {}: {e}. Starting fresh.", checkpoint_path.display());
                return None;
            }
        };

        let results_path = self.results_path(key);
        let results: Vec<WorkResult<T>> = match tokio::fs::read_to_string(&results_path)
            .await
            .map_err(Error::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(Error::from))
        {
            Ok(results) => results,
            Err(e) => {
                log::error!("Failed to load results {}: {e}. Starting fresh.", results_path.display());
                return None;
            }
        };

        let mut checkpoint = Checkpoint {
            completed: file.words_processed.into_iter().collect(),
            results: Vec::with_capacity(results.len()),
            last_updated: file.last_updated,
        };
        let mut seen = BTreeSet::new();
        for result in results {
            if checkpoint.completed.contains(&result.word) && seen.insert(result.word.clone()) {
                checkpoint.results.push(result);
            }
        }

        log::info!(
            "Resumed checkpoint '{key}': {} items processed, last updated {}",
            checkpoint.completed.len(),
            checkpoint.last_updated
        );
        Some(checkpoint)
    }

    /// Persists `checkpoint`. Results are written before the identifier list so a
    /// checkpoint never names items whose results aren't on disk.
    pub async fn save<T: Serialize>(&self, key: &str, checkpoint: &Checkpoint<T>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::storage(&self.dir, e))?;

        let results = serde_json::to_vec_pretty(&checkpoint.results)?;
        write_atomic(&self.results_path(key), &results).await?;

        let file = CheckpointFile {
            words_processed: checkpoint.completed.iter().cloned().collect(),
            last_updated: checkpoint.last_updated,
        };
        write_atomic(&self.checkpoint_path(key), &serde_json::to_vec_pretty(&file)?).await?;

        log::info!("Checkpoint saved: {} items processed", checkpoint.completed.len());
        Ok(())
    }

    /// Deletes the checkpoint so the next run starts fresh.
    pub async fn clear(&self, key: &str) -> Result<()> {
        for path in [self.checkpoint_path(key), self.results_path(key)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => log::info!("Cleaned up {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(Error::storage(path, e)),
            }
        }
        Ok(())
    }
}
