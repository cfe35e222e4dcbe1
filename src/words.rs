use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::Result;

#[derive(Deserialize)]
struct WordRow {
    word: String,
}

/// Reads the work items for a run.
///
/// `.json` files are a words export (`[{ "word": ... }, ...]`), anything else is a plain
/// list with one word per line. Words are trimmed, blanks skipped, and repeats dropped
/// keeping the first occurrence.
pub async fn load_word_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await?;

    let words: Vec<String> = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str::<Vec<WordRow>>(&content)?
            .into_iter()
            .map(|row| row.word)
            .collect()
    } else {
        content.lines().map(str::to_string).collect()
    };

    let words = dedup_words(words);
    log::info!("Loaded {} words from {}", words.len(), path.display());
    Ok(words)
}

/// Trims, drops blanks and removes repeats while preserving order.
pub fn dedup_words(words: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    words
        .into_iter()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty() && seen.insert(w.clone()))
        .collect()
}

/// Writes one word per line.
pub async fn save_word_list(path: impl AsRef<Path>, words: &[String]) -> Result<()> {
    let mut content = words.join("\n");
    content.push('\n');
    crate::checkpoint::write_atomic(path.as_ref(), content.as_bytes()).await
}
