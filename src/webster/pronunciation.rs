use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::parse::parse_text_pronunciations;
use super::request::{encode_path_segment, request_page_html, ProxyClients};
use super::parse_off_thread;
use crate::fetch::{Extract, ExtractError};
use crate::proxy::Proxy;
use crate::DICTIONARY_HOME;

const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PronunciationCheck {
    pub word: String,
    pub text_pronunciations: Vec<String>,
}

/// Looks up only the text pronunciations of a word.
pub struct PronunciationChecker {
    clients: ProxyClients,
}

impl PronunciationChecker {
    pub fn new() -> Self {
        PronunciationChecker {
            clients: ProxyClients::new(TIMEOUT),
        }
    }
}

impl Default for PronunciationChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl Extract for PronunciationChecker {
    type Output = PronunciationCheck;

    async fn extract(&self, item: &str, proxy: &Proxy) -> Result<PronunciationCheck, ExtractError> {
        let client = self.clients.client_for(proxy)?;
        let url = format!("{DICTIONARY_HOME}/dictionary/{}", encode_path_segment(item));
        let html = request_page_html(&client, &url).await?;

        let text_pronunciations = parse_off_thread(move || parse_text_pronunciations(&html)).await?;
        Ok(PronunciationCheck {
            word: item.to_string(),
            text_pronunciations,
        })
    }
}
