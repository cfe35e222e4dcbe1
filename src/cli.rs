use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use clap::Parser;

use crate::config::{BatchConfig, DelayRange, PoolConfig, RetryPolicy};
use crate::export::{
    load_audio_urls, load_pronunciation_rows, merge_text_pronunciations, words_needing_text_pronunciations,
    write_dictionary_export, write_pronunciation_rows, write_text_pronunciations,
};
use crate::job::{build_fetcher, finish_job, run_job, JobOptions};
use crate::proxy::harvest::harvest_proxies;
use crate::schedule::Shutdown;
use crate::webster::browse::{known_page_count, merge_pages, page_key};
use crate::webster::{AudioDownloader, BrowsePages, DefinitionScraper, PageCountProbe, PronunciationChecker};
use crate::words::{load_word_list, save_word_list};
use crate::{
    info_time, Error, Result, BATCH_PAUSE_MS, BATCH_SIZE, CHECKPOINT_EVERY, MAX_ATTEMPTS,
    PROXY_COOLDOWN_MS, WORKERS,
};

#[derive(Parser)]
#[command(name = "webster-scrape", version, about = "Resumable dictionary scraper behind rotating proxies")]
pub enum Cli {
    /// Collect public proxies into a proxy list file
    HarvestProxies(HarvestArgs),
    /// Crawl the browse pages of a letter into a word list
    Words(WordsArgs),
    /// Scrape full dictionary entries for a word list
    Definitions(DefinitionsArgs),
    /// Look up text pronunciations for a word list
    Pronunciations(PronunciationsArgs),
    /// Download pronunciation audio listed in a pronunciations export
    Audio(AudioArgs),
}

#[derive(clap::Args)]
pub struct HarvestArgs {
    /// Where to write the proxy list
    #[arg(long, default_value = "proxies.json")]
    output: PathBuf,
    /// Only keep proxies that reach the dictionary
    #[arg(long)]
    validate: bool,
    /// Concurrent validation checks
    #[arg(long, default_value_t = 50)]
    concurrency: usize,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Proxy list: JSON `{"proxies": [...]}` or one address per line
    #[arg(long, default_value = "proxies.json")]
    proxies: PathBuf,
    /// Concurrent requests per batch
    #[arg(long, default_value_t = WORKERS)]
    workers: usize,
    /// Items per batch
    #[arg(long, default_value_t = BATCH_SIZE)]
    batch_size: usize,
    /// Save a checkpoint every N batches
    #[arg(long, default_value_t = CHECKPOINT_EVERY)]
    checkpoint_every: usize,
    /// Attempts per item before giving up on it
    #[arg(long, default_value_t = MAX_ATTEMPTS)]
    max_attempts: usize,
    /// Minimum pause between two uses of one proxy
    #[arg(long, default_value_t = PROXY_COOLDOWN_MS)]
    cooldown_ms: u64,
    /// Skip items recorded in an existing checkpoint
    #[arg(long)]
    resume: bool,
    /// Keep the checkpoint after a completed run
    #[arg(long)]
    keep_checkpoint: bool,
    /// Directory for checkpoints and outputs
    #[arg(long, default_value = ".")]
    state_dir: PathBuf,
    /// Run name used for checkpoint and output files
    #[arg(long)]
    key: Option<String>,
}

#[derive(clap::Args)]
pub struct WordsArgs {
    /// Starting letter to crawl
    #[arg(long)]
    letter: char,
    /// Number of browse pages, looked up when omitted
    #[arg(long)]
    pages: Option<usize>,
    #[command(flatten)]
    run: RunArgs,
}

#[derive(clap::Args)]
pub struct DefinitionsArgs {
    /// Word list (plain text or JSON words export)
    #[arg(long)]
    words: PathBuf,
    #[command(flatten)]
    run: RunArgs,
}

#[derive(clap::Args)]
pub struct PronunciationsArgs {
    /// Word list (plain text or JSON words export)
    #[arg(long)]
    words: PathBuf,
    /// Merge into this pronunciations export instead of writing a separate file.
    /// Words whose rows already have text pronunciations are skipped.
    #[arg(long)]
    merge_into: Option<PathBuf>,
    #[command(flatten)]
    run: RunArgs,
}

#[derive(clap::Args)]
pub struct AudioArgs {
    /// Pronunciations export produced by `definitions`
    #[arg(long)]
    pronunciations: PathBuf,
    /// Directory for downloaded audio
    #[arg(long, default_value = "audio")]
    out_dir: PathBuf,
    #[command(flatten)]
    run: RunArgs,
}

impl RunArgs {
    fn job_options(&self, default_key: String) -> JobOptions {
        JobOptions {
            proxies: self.proxies.clone(),
            state_dir: self.state_dir.clone(),
            key: self.key.clone().unwrap_or(default_key),
            pool: PoolConfig {
                cooldown: Duration::from_millis(self.cooldown_ms),
            },
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                ..RetryPolicy::default()
            },
            batch: BatchConfig {
                workers: self.workers,
                batch_size: self.batch_size,
                checkpoint_every: self.checkpoint_every,
                pause: DelayRange::new(BATCH_PAUSE_MS.0, BATCH_PAUSE_MS.1),
                resume: self.resume,
            },
            keep_checkpoint: self.keep_checkpoint,
        }
    }
}

/// `a_words.txt` -> `a_words`
fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("run")
        .to_string()
}

pub async fn run(cli: Cli, shutdown: Shutdown) -> Result<()> {
    let start_time = Local::now();
    match cli {
        Cli::HarvestProxies(args) => {
            harvest_proxies(&args.output, args.validate, args.concurrency).await?;
        }
        Cli::Words(args) => crawl_words(args, shutdown).await?,
        Cli::Definitions(args) => scrape_definitions(args, shutdown).await?,
        Cli::Pronunciations(args) => check_pronunciations(args, shutdown).await?,
        Cli::Audio(args) => download_audio(args, shutdown).await?,
    }
    info_time!(start_time, "Full program time:");
    Ok(())
}

async fn crawl_words(args: WordsArgs, shutdown: Shutdown) -> Result<()> {
    let letter = args.letter.to_ascii_lowercase();
    let opts = args.run.job_options(format!("{letter}_browse"));
    let fetcher = build_fetcher(&opts).await?;

    let pages = match args.pages.or_else(|| known_page_count(letter)) {
        Some(pages) => pages,
        None => match fetcher.fetch(&letter.to_string(), &PageCountProbe::new()).await {
            Ok(fetched) => fetched.into_option().ok_or(Error::UnknownPageCount(letter))?,
            Err(e) => {
                log::error!("Couldn't look up page count: {e}");
                return Err(Error::UnknownPageCount(letter));
            }
        },
    };
    info_time!("Collecting words for letter '{letter}' from {pages} pages");

    let items = (1..=pages).map(|page| page_key(letter, page)).collect();
    let report = run_job(&opts, fetcher, BrowsePages::new(), items, shutdown).await?;
    if report.interrupted {
        return finish_job(&opts, &report).await;
    }

    let pages: Vec<_> = report
        .checkpoint
        .results()
        .iter()
        .filter_map(|r| r.payload.clone())
        .collect();
    let words = merge_pages(pages);
    let path = opts.state_dir.join(format!("{letter}_words.txt"));
    save_word_list(&path, &words).await?;
    info_time!("Saved {} words to {}", words.len(), path.display());

    finish_job(&opts, &report).await
}

async fn scrape_definitions(args: DefinitionsArgs, shutdown: Shutdown) -> Result<()> {
    let opts = args
        .run
        .job_options(format!("{}_dictionary_data", file_stem(&args.words)));
    let words = load_word_list(&args.words).await?;
    let fetcher = build_fetcher(&opts).await?;

    let report = run_job(&opts, fetcher, DefinitionScraper::new(), words.clone(), shutdown).await?;
    if report.interrupted {
        return finish_job(&opts, &report).await;
    }

    let entries: Vec<_> = report
        .checkpoint
        .results_in_order(&words)
        .into_iter()
        .filter_map(|r| r.payload.clone())
        .collect();
    write_dictionary_export(&opts.output_base(), &entries).await?;

    finish_job(&opts, &report).await
}

async fn check_pronunciations(args: PronunciationsArgs, shutdown: Shutdown) -> Result<()> {
    let opts = args
        .run
        .job_options(format!("{}_pronunciations", file_stem(&args.words)));
    let mut words = load_word_list(&args.words).await?;
    let existing = match &args.merge_into {
        Some(path) => {
            let rows = load_pronunciation_rows(path).await?;
            let total = words.len();
            words = words_needing_text_pronunciations(&rows, words);
            info_time!(
                "{} of {total} words need text pronunciations in {}",
                words.len(),
                path.display()
            );
            Some((path, rows))
        }
        None => None,
    };
    let fetcher = build_fetcher(&opts).await?;

    let report = run_job(&opts, fetcher, PronunciationChecker::new(), words.clone(), shutdown).await?;
    if report.interrupted {
        return finish_job(&opts, &report).await;
    }

    let results = report.checkpoint.results_in_order(&words);
    match existing {
        Some((path, mut rows)) => {
            let merged = merge_text_pronunciations(&mut rows, &results);
            write_pronunciation_rows(path, &rows).await?;
            info_time!(
                "Updated {} rows, added {} rows in {}",
                merged.updated_rows,
                merged.added_rows,
                path.display()
            );
        }
        None => {
            write_text_pronunciations(&opts.output_base(), &results).await?;
        }
    }
    finish_job(&opts, &report).await
}

async fn download_audio(args: AudioArgs, shutdown: Shutdown) -> Result<()> {
    let opts = args
        .run
        .job_options(format!("{}_audio", file_stem(&args.pronunciations)));
    let urls = load_audio_urls(&args.pronunciations).await?;
    info_time!("Found {} words with audio", urls.len());
    let fetcher = build_fetcher(&opts).await?;

    let words: Vec<String> = urls.iter().map(|(word, _)| word.clone()).collect();
    let downloader = AudioDownloader::new(urls, &args.out_dir);
    let report = run_job(&opts, fetcher, downloader, words, shutdown).await?;
    if !report.interrupted {
        let bytes: usize = report
            .checkpoint
            .results()
            .iter()
            .filter_map(|r| r.payload.as_ref())
            .map(|d| d.bytes)
            .sum();
        info_time!(
            "Downloaded {} audio files ({bytes} bytes) into {}",
            report.found,
            args.out_dir.display()
        );
    }

    finish_job(&opts, &report).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_definitions_run() {
        let cli = Cli::try_parse_from([
            "webster-scrape",
            "definitions",
            "--words",
            "a_words.txt",
            "--workers",
            "8",
            "--batch-size",
            "3",
            "--resume",
        ])
        .unwrap();
        let Cli::Definitions(args) = cli else {
            panic!("wrong subcommand");
        };
        let opts = args.run.job_options(format!("{}_dictionary_data", file_stem(&args.words)));
        assert_eq!(opts.key, "a_words_dictionary_data");
        assert_eq!(opts.batch.workers, 8);
        assert_eq!(opts.batch.batch_size, 3);
        assert_eq!(opts.batch.checkpoint_every, CHECKPOINT_EVERY);
        assert!(opts.batch.resume);
        assert!(!opts.keep_checkpoint);
        assert_eq!(opts.proxies, PathBuf::from("proxies.json"));
    }

    #[test]
    fn explicit_key_wins() {
        let cli = Cli::try_parse_from([
            "webster-scrape",
            "words",
            "--letter",
            "Q",
            "--key",
            "letters",
            "--cooldown-ms",
            "1000",
        ])
        .unwrap();
        let Cli::Words(args) = cli else {
            panic!("wrong subcommand");
        };
        assert_eq!(args.letter, 'Q');
        let opts = args.run.job_options("q_browse".into());
        assert_eq!(opts.key, "letters");
        assert_eq!(opts.pool.cooldown, Duration::from_millis(1000));
    }

    #[test]
    fn pronunciations_can_merge_into_export() {
        let cli = Cli::try_parse_from([
            "webster-scrape",
            "pronunciations",
            "--words",
            "a_words.txt",
            "--merge-into",
            "a_dictionary_data_pronunciations.json",
        ])
        .unwrap();
        let Cli::Pronunciations(args) = cli else {
            panic!("wrong subcommand");
        };
        assert_eq!(
            args.merge_into,
            Some(PathBuf::from("a_dictionary_data_pronunciations.json"))
        );
    }

    #[test]
    fn words_requires_letter() {
        assert!(Cli::try_parse_from(["webster-scrape", "words"]).is_err());
    }
}
