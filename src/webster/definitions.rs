use std::time::Duration;

use super::parse::{parse_entry, WordEntry};
use super::request::{encode_path_segment, request_page_html, ProxyClients};
use super::parse_off_thread;
use crate::fetch::{Extract, ExtractError};
use crate::proxy::Proxy;
use crate::DICTIONARY_HOME;

const TIMEOUT: Duration = Duration::from_secs(30);

/// Scrapes the full dictionary entry of a word.
pub struct DefinitionScraper {
    clients: ProxyClients,
}

impl DefinitionScraper {
    pub fn new() -> Self {
        DefinitionScraper {
            clients: ProxyClients::new(TIMEOUT),
        }
    }
}

impl Default for DefinitionScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl Extract for DefinitionScraper {
    type Output = WordEntry;

    async fn extract(&self, item: &str, proxy: &Proxy) -> Result<WordEntry, ExtractError> {
        let client = self.clients.client_for(proxy)?;
        let url = format!("{DICTIONARY_HOME}/dictionary/{}", encode_path_segment(item));
        let html = request_page_html(&client, &url).await?;

        let word = item.to_string();
        let entry = parse_off_thread(move || parse_entry(&word, &html)).await?;
        log::debug!("Scraped: {}", entry.word);
        Ok(entry)
    }
}
