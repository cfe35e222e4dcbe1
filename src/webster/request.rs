use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Client, Response,
};

use crate::fetch::ExtractError;
use crate::proxy::Proxy;
use crate::DICTIONARY_HOME;

/// One reqwest `Client` per proxy slot, built on first use.
///
/// Clients are `Arc`s internally, so handing out clones is cheap and keeps connection
/// pooling per proxy.
pub struct ProxyClients {
    clients: Mutex<HashMap<usize, Client>>,
    timeout: Duration,
}

impl ProxyClients {
    pub fn new(timeout: Duration) -> Self {
        ProxyClients {
            clients: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn client_for(&self, proxy: &Proxy) -> Result<Client, ExtractError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&proxy.slot()) {
            return Ok(client.clone());
        }

        let client = build_client(proxy, self.timeout)
            .map_err(|e| ExtractError::Other(format!("proxy {proxy}: {e}")))?;
        clients.insert(proxy.slot(), client.clone());
        Ok(client)
    }
}

fn build_client(proxy: &Proxy, timeout: Duration) -> reqwest::Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));

    Client::builder()
        .proxy(reqwest::Proxy::all(proxy.url())?)
        .timeout(timeout)
        // Free proxies routinely intercept TLS.
        .danger_accept_invalid_certs(true)
        .default_headers(headers)
        .build()
}

/// Chrome user agent with a random major version, so requests don't share one fingerprint.
fn random_user_agent() -> String {
    let version = rand::thread_rng().gen_range(100..=125);
    format!(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version}.0.0.0 Safari/537.36"
    )
}

async fn request(client: &Client, url: &str) -> Result<Response, ExtractError> {
    let res = client
        .get(url)
        .header(header::USER_AGENT, random_user_agent())
        .header(header::REFERER, format!("{DICTIONARY_HOME}/"))
        .send()
        .await?;

    let status = res.status();
    if !status.is_success() {
        return Err(ExtractError::from_status(status));
    }
    Ok(res)
}

/// Requests a page and returns its HTML.
pub async fn request_page_html(client: &Client, url: &str) -> Result<String, ExtractError> {
    let html = request(client, url).await?.text().await?;
    Ok(html)
}

/// Requests a binary resource, e.g. an audio file.
pub async fn request_bytes(client: &Client, url: &str) -> Result<Vec<u8>, ExtractError> {
    let bytes = request(client, url).await?.bytes().await?;
    Ok(bytes.to_vec())
}

/// Percent-encodes a word for use as a single path segment.
pub fn encode_path_segment(word: &str) -> String {
    urlencoding::encode(word).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_spaces_and_unicode() {
        assert_eq!(encode_path_segment("apple"), "apple");
        assert_eq!(encode_path_segment("à la carte"), "%C3%A0%20la%20carte");
        assert_eq!(encode_path_segment("o'clock"), "o%27clock");
    }

    #[test]
    fn user_agent_version_in_range() {
        for _ in 0..50 {
            let ua = random_user_agent();
            let version: u32 = ua
                .split("Chrome/")
                .nth(1)
                .and_then(|rest| rest.split('.').next())
                .and_then(|v| v.parse().ok())
                .unwrap();
            assert!((100..=125).contains(&version));
        }
    }
}
