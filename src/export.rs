//! Final run outputs, split into flat JSON tables for database import.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{write_atomic, WorkResult};
use crate::webster::{PronunciationCheck, WordEntry};
use crate::{info_time, Result};

#[derive(Debug, Serialize)]
struct WordRow<'a> {
    word: &'a str,
    part_of_speech: Option<&'a str>,
    syllables: Option<&'a str>,
    etymology: Option<&'a str>,
    scraped_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct DefinitionRow<'a> {
    word: &'a str,
    definition_number: usize,
    definition_text: &'a str,
    scraped_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ExampleRow<'a> {
    word: &'a str,
    definition_number: usize,
    example_number: usize,
    example_text: &'a str,
    attribution: Option<&'a str>,
    scraped_at: DateTime<Utc>,
}

/// One pronunciation of one word. Also the input format of the audio downloader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationRow {
    pub word: String,
    pub pronunciation_number: usize,
    pub pronunciation_text: Option<String>,
    pub audio_dir: Option<String>,
    pub audio_file: Option<String>,
    pub audio_url: Option<String>,
    /// Set by a pronunciation check merged into this export. An empty list means the
    /// word was checked and had none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_pronunciations: Option<Vec<String>>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub total_words: usize,
    pub total_definitions: usize,
    pub total_examples: usize,
    pub total_pronunciations: usize,
    pub scrape_completed_at: DateTime<Utc>,
    pub average_definitions_per_word: f64,
    pub average_examples_per_definition: f64,
    pub average_pronunciations_per_word: f64,
}

fn ratio(count: usize, of: usize) -> f64 {
    if of == 0 {
        0.0
    } else {
        count as f64 / of as f64
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, &serde_json::to_vec_pretty(value)?).await
}

/// Writes `<base>_words.json`, `_definitions.json`, `_examples.json`,
/// `_pronunciations.json` and `_metadata.json`.
pub async fn write_dictionary_export(base: &Path, entries: &[WordEntry]) -> Result<ExportSummary> {
    let mut words = Vec::with_capacity(entries.len());
    let mut definitions = Vec::new();
    let mut examples = Vec::new();
    let mut pronunciations = Vec::new();

    for entry in entries {
        words.push(WordRow {
            word: &entry.word,
            part_of_speech: entry.part_of_speech.as_deref(),
            syllables: entry.syllables.as_deref(),
            etymology: entry.etymology.as_deref(),
            scraped_at: entry.scraped_at,
        });

        for def in &entry.definitions {
            definitions.push(DefinitionRow {
                word: &entry.word,
                definition_number: def.definition_number,
                definition_text: &def.definition_text,
                scraped_at: entry.scraped_at,
            });
            for (n, ex) in def.examples.iter().enumerate() {
                examples.push(ExampleRow {
                    word: &entry.word,
                    definition_number: def.definition_number,
                    example_number: n + 1,
                    example_text: &ex.text,
                    attribution: ex.attribution.as_deref(),
                    scraped_at: entry.scraped_at,
                });
            }
        }

        for (n, pron) in entry.pronunciations.iter().enumerate() {
            pronunciations.push(PronunciationRow {
                word: entry.word.clone(),
                pronunciation_number: n + 1,
                pronunciation_text: Some(pron.text.clone()),
                audio_dir: pron.audio_dir.clone(),
                audio_file: pron.audio_file.clone(),
                audio_url: pron.audio_url.clone(),
                text_pronunciations: None,
                scraped_at: entry.scraped_at,
            });
        }
    }

    write_json(&with_suffix(base, "_words.json"), &words).await?;
    write_json(&with_suffix(base, "_definitions.json"), &definitions).await?;
    write_json(&with_suffix(base, "_examples.json"), &examples).await?;
    write_json(&with_suffix(base, "_pronunciations.json"), &pronunciations).await?;

    let summary = ExportSummary {
        total_words: words.len(),
        total_definitions: definitions.len(),
        total_examples: examples.len(),
        total_pronunciations: pronunciations.len(),
        scrape_completed_at: Utc::now(),
        average_definitions_per_word: ratio(definitions.len(), words.len()),
        average_examples_per_definition: ratio(examples.len(), definitions.len()),
        average_pronunciations_per_word: ratio(pronunciations.len(), words.len()),
    };
    write_json(&with_suffix(base, "_metadata.json"), &summary).await?;

    info_time!(
        "Saved {} words, {} definitions, {} examples, {} pronunciations to {}_*.json",
        summary.total_words,
        summary.total_definitions,
        summary.total_examples,
        summary.total_pronunciations,
        base.display()
    );
    Ok(summary)
}

fn text_of(result: &WorkResult<PronunciationCheck>) -> Vec<String> {
    result
        .payload
        .as_ref()
        .map(|check| check.text_pronunciations.clone())
        .unwrap_or_default()
}

/// Writes `<base>_text_pronunciations.json`. Words without data get an empty list so they
/// aren't looked up again.
pub async fn write_text_pronunciations(
    base: &Path,
    results: &[&WorkResult<PronunciationCheck>],
) -> Result<PathBuf> {
    let rows: Vec<PronunciationCheck> = results
        .iter()
        .map(|r| PronunciationCheck {
            word: r.word.clone(),
            text_pronunciations: text_of(r),
        })
        .collect();

    let path = with_suffix(base, "_text_pronunciations.json");
    write_json(&path, &rows).await?;
    info_time!("Saved {} pronunciation checks to {}", rows.len(), path.display());
    Ok(path)
}

/// Reads a pronunciations export. A missing file is an empty export.
pub async fn load_pronunciation_rows(path: &Path) -> Result<Vec<PronunciationRow>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

pub async fn write_pronunciation_rows(path: &Path, rows: &[PronunciationRow]) -> Result<()> {
    write_json(path, rows).await
}

/// Drops the words whose rows in `rows` already carry text pronunciations.
pub fn words_needing_text_pronunciations(rows: &[PronunciationRow], words: Vec<String>) -> Vec<String> {
    let checked: HashSet<&str> = rows
        .iter()
        .filter(|row| row.text_pronunciations.is_some())
        .map(|row| row.word.as_str())
        .collect();
    words
        .into_iter()
        .filter(|word| !checked.contains(word.as_str()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub updated_rows: usize,
    pub added_rows: usize,
}

/// Merges pronunciation check results into an existing pronunciations export.
///
/// Every row of a checked word gets its text pronunciations. A word without rows gets a new
/// row numbered 1 with no audio. Not found words are merged with an empty list.
pub fn merge_text_pronunciations(
    rows: &mut Vec<PronunciationRow>,
    results: &[&WorkResult<PronunciationCheck>],
) -> MergeSummary {
    let mut by_word: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        by_word.entry(row.word.clone()).or_default().push(idx);
    }

    let mut summary = MergeSummary::default();
    for result in results {
        let text = text_of(result);
        match by_word.get(&result.word) {
            Some(indices) => {
                for &idx in indices {
                    rows[idx].text_pronunciations = Some(text.clone());
                    summary.updated_rows += 1;
                }
            }
            None => {
                by_word.insert(result.word.clone(), vec![rows.len()]);
                rows.push(PronunciationRow {
                    word: result.word.clone(),
                    pronunciation_number: 1,
                    pronunciation_text: None,
                    audio_dir: None,
                    audio_file: None,
                    audio_url: None,
                    text_pronunciations: Some(text),
                    scraped_at: result.completed_at,
                });
                summary.added_rows += 1;
            }
        }
    }
    summary
}

/// Reads a pronunciations export and returns the first audio URL of every word, in file order.
pub async fn load_audio_urls(path: &Path) -> Result<Vec<(String, String)>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let rows: Vec<PronunciationRow> = serde_json::from_str(&raw)?;

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for row in rows {
        let Some(url) = row.audio_url else { continue };
        if seen.insert(row.word.clone()) {
            urls.push((row.word, url));
        }
    }
    Ok(urls)
}
