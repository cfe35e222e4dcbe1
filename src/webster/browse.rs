use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::parse::{parse_browse_words, parse_page_count};
use super::request::{request_page_html, ProxyClients};
use super::parse_off_thread;
use crate::fetch::{Extract, ExtractError};
use crate::proxy::Proxy;
use crate::DICTIONARY_HOME;

const TIMEOUT: Duration = Duration::from_secs(20);

/// Browse page counts per starting letter, as last seen on the site.
const LETTER_PAGES: [(char, usize); 24] = [
    ('b', 72),
    ('c', 109),
    ('e', 38),
    ('f', 47),
    ('g', 41),
    ('h', 45),
    ('i', 38),
    ('j', 11),
    ('k', 15),
    ('l', 38),
    ('m', 62),
    ('n', 28),
    ('o', 32),
    ('p', 101),
    ('q', 6),
    ('r', 55),
    ('s', 134),
    ('t', 65),
    ('u', 28),
    ('v', 16),
    ('w', 32),
    ('x', 2),
    ('y', 5),
    ('z', 4),
];

pub fn known_page_count(letter: char) -> Option<usize> {
    LETTER_PAGES
        .iter()
        .find(|(l, _)| *l == letter)
        .map(|(_, pages)| *pages)
}

/// Work item key for a browse page, e.g. `a/12`.
pub fn page_key(letter: char, page: usize) -> String {
    format!("{letter}/{page}")
}

pub fn parse_page_key(key: &str) -> Option<(char, usize)> {
    let (letter, page) = key.split_once('/')?;
    let mut chars = letter.chars();
    let letter = chars.next().filter(|_| chars.next().is_none())?;
    Some((letter, page.parse().ok()?))
}

fn browse_url(letter: char, page: usize) -> String {
    format!("{DICTIONARY_HOME}/browse/dictionary/{letter}/{page}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowsePage {
    pub letter: char,
    pub page: usize,
    pub words: Vec<String>,
}

/// Collects the word list shown on one browse page.
pub struct BrowsePages {
    clients: ProxyClients,
}

impl BrowsePages {
    pub fn new() -> Self {
        BrowsePages {
            clients: ProxyClients::new(TIMEOUT),
        }
    }
}

impl Default for BrowsePages {
    fn default() -> Self {
        Self::new()
    }
}

impl Extract for BrowsePages {
    type Output = BrowsePage;

    async fn extract(&self, item: &str, proxy: &Proxy) -> Result<BrowsePage, ExtractError> {
        let (letter, page) = parse_page_key(item)
            .ok_or_else(|| ExtractError::Other(format!("bad browse page key '{item}'")))?;
        let client = self.clients.client_for(proxy)?;
        let html = request_page_html(&client, &browse_url(letter, page)).await?;

        let words = parse_off_thread(move || parse_browse_words(&html)).await?;
        // An empty list means a block page or a truncated response, never a real page.
        if words.is_empty() {
            return Err(ExtractError::Other(format!("no words found on page {item}")));
        }
        log::debug!("Found {} words on page {item}", words.len());
        Ok(BrowsePage {
            letter,
            page,
            words,
        })
    }
}

/// Reads the total number of browse pages for a letter from its first page.
/// The item is the letter itself.
pub struct PageCountProbe {
    clients: ProxyClients,
}

impl PageCountProbe {
    pub fn new() -> Self {
        PageCountProbe {
            clients: ProxyClients::new(TIMEOUT),
        }
    }
}

impl Default for PageCountProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Extract for PageCountProbe {
    type Output = usize;

    async fn extract(&self, item: &str, proxy: &Proxy) -> Result<usize, ExtractError> {
        let letter = item
            .chars()
            .next()
            .ok_or_else(|| ExtractError::Other("empty letter".into()))?;
        let client = self.clients.client_for(proxy)?;
        let html = request_page_html(&client, &browse_url(letter, 1)).await?;

        parse_off_thread(move || parse_page_count(&html))
            .await?
            .ok_or_else(|| ExtractError::Other("could not find pagination info".into()))
    }
}

/// Flattens browse results into one word list, pages in order, repeats removed.
pub fn merge_pages(mut pages: Vec<BrowsePage>) -> Vec<String> {
    pages.sort_by_key(|p| (p.letter, p.page));
    crate::words::dedup_words(pages.into_iter().flat_map(|p| p.words))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_keys_round_trip() {
        assert_eq!(page_key('a', 12), "a/12");
        assert_eq!(parse_page_key("a/12"), Some(('a', 12)));
        assert_eq!(parse_page_key("ab/12"), None);
        assert_eq!(parse_page_key("a/x"), None);
        assert_eq!(parse_page_key("a"), None);
    }

    #[test]
    fn known_counts() {
        assert_eq!(known_page_count('s'), Some(134));
        assert_eq!(known_page_count('a'), None);
    }

    #[test]
    fn pages_merge_in_order_without_repeats() {
        let page = |n, words: &[&str]| BrowsePage {
            letter: 'q',
            page: n,
            words: words.iter().map(|w| w.to_string()).collect(),
        };
        let merged = merge_pages(vec![
            page(2, &["quack", "quad"]),
            page(1, &["q", "qua", "quack"]),
        ]);
        assert_eq!(merged, vec!["q", "qua", "quack", "quad"]);
    }
}
