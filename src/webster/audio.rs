use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::request::{request_bytes, ProxyClients};
use crate::checkpoint::write_atomic;
use crate::fetch::{Extract, ExtractError};
use crate::proxy::Proxy;

const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDownload {
    pub word: String,
    pub path: PathBuf,
    pub bytes: usize,
}

struct Target {
    url: String,
    path: PathBuf,
}

/// Downloads the pronunciation audio of a word into `out_dir`.
pub struct AudioDownloader {
    clients: ProxyClients,
    targets: HashMap<String, Target>,
    out_dir: PathBuf,
}

impl AudioDownloader {
    /// `urls` pairs each word with the audio file to fetch for it. The first URL of a word
    /// wins. Words whose file names would collide get a numeric suffix, in input order.
    pub fn new(urls: impl IntoIterator<Item = (String, String)>, out_dir: impl Into<PathBuf>) -> Self {
        let out_dir = out_dir.into();
        let mut targets = HashMap::new();
        let mut taken = HashSet::new();
        for (word, url) in urls {
            if targets.contains_key(&word) {
                continue;
            }
            let stem = file_stem(&word);
            let mut name = stem.clone();
            let mut n = 1;
            while !taken.insert(name.clone()) {
                n += 1;
                name = format!("{stem}_{n}");
            }
            let path = out_dir.join(format!("{name}_pronunciation.mp3"));
            targets.insert(word, Target { url, path });
        }
        AudioDownloader {
            clients: ProxyClients::new(TIMEOUT),
            targets,
            out_dir,
        }
    }

    pub fn output_path(&self, word: &str) -> Option<&Path> {
        self.targets.get(word).map(|t| t.path.as_path())
    }
}

/// Keeps a word usable as a file name.
fn file_stem(word: &str) -> String {
    word.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Extract for AudioDownloader {
    type Output = AudioDownload;

    async fn extract(&self, item: &str, proxy: &Proxy) -> Result<AudioDownload, ExtractError> {
        let Some(target) = self.targets.get(item) else {
            return Err(ExtractError::NotFound);
        };
        let client = self.clients.client_for(proxy)?;
        let audio = request_bytes(&client, &target.url).await?;
        if audio.is_empty() {
            return Err(ExtractError::Transient(format!("empty audio body for '{item}'")));
        }

        let path = target.path.clone();
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| ExtractError::Other(e.to_string()))?;
        write_atomic(&path, &audio)
            .await
            .map_err(|e| ExtractError::Other(e.to_string()))?;

        log::debug!("Downloaded pronunciation for '{item}' to {}", path.display());
        Ok(AudioDownload {
            word: item.to_string(),
            path,
            bytes: audio.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::proxy::ProxyPool;

    fn urls(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(w, u)| (w.to_string(), u.to_string()))
            .collect()
    }

    #[test]
    fn output_names_are_safe() {
        let downloader = AudioDownloader::new(
            urls(&[("splanchnicectomy", "https://a.test/1.mp3"), ("and/or", "https://a.test/2.mp3")]),
            "audio",
        );
        assert_eq!(
            downloader.output_path("splanchnicectomy"),
            Some(Path::new("audio/splanchnicectomy_pronunciation.mp3"))
        );
        assert_eq!(
            downloader.output_path("and/or"),
            Some(Path::new("audio/and_or_pronunciation.mp3"))
        );
        assert_eq!(downloader.output_path("missing"), None);
    }

    #[test]
    fn colliding_words_get_distinct_files() {
        let downloader = AudioDownloader::new(
            urls(&[
                ("a b", "https://a.test/1.mp3"),
                ("a_b", "https://a.test/2.mp3"),
                ("a?b", "https://a.test/3.mp3"),
                ("a_b_2", "https://a.test/4.mp3"),
                ("a b", "https://a.test/ignored.mp3"),
            ]),
            "audio",
        );
        let paths: HashSet<&Path> = ["a b", "a_b", "a?b", "a_b_2"]
            .iter()
            .map(|w| downloader.output_path(w).unwrap())
            .collect();
        assert_eq!(paths.len(), 4);
        assert_eq!(
            downloader.output_path("a b"),
            Some(Path::new("audio/a_b_pronunciation.mp3"))
        );
        assert_eq!(
            downloader.output_path("a_b"),
            Some(Path::new("audio/a_b_2_pronunciation.mp3"))
        );
        assert_eq!(downloader.targets["a b"].url, "https://a.test/1.mp3");
    }

    #[tokio::test]
    async fn word_without_url_is_not_found() {
        let downloader = AudioDownloader::new(Vec::new(), "audio");
        let pool = ProxyPool::new(["127.0.0.1:9"], &PoolConfig::default()).unwrap();
        let err = downloader.extract("apple", &pool.acquire()).await.unwrap_err();
        assert!(matches!(err, ExtractError::NotFound));
    }
}
