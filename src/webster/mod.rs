//! Extractors for the dictionary site. Each one performs a single request through the
//! proxy it is handed and turns the response into a record.

pub mod audio;
pub mod browse;
pub mod definitions;
pub mod parse;
pub mod pronunciation;
mod request;

pub use audio::{AudioDownload, AudioDownloader};
pub use browse::{BrowsePage, BrowsePages, PageCountProbe};
pub use definitions::DefinitionScraper;
pub use parse::{Definition, Example, Pronunciation, WordEntry};
pub use pronunciation::{PronunciationCheck, PronunciationChecker};
pub use request::{encode_path_segment, ProxyClients};

use tokio::task::spawn_blocking;

use crate::fetch::ExtractError;

/// Runs an HTML parse on the blocking pool. `scraper::Html` isn't `Send`, and parsing a
/// large page shouldn't stall the async workers either.
async fn parse_off_thread<T, F>(parse: F) -> Result<T, ExtractError>
where
    T: Send + 'static,
    F: FnOnce() -> crate::Result<T> + Send + 'static,
{
    spawn_blocking(parse)
        .await
        .map_err(|e| ExtractError::Other(e.to_string()))?
        .map_err(|e| ExtractError::Other(e.to_string()))
}
