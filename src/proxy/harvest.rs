use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use regex::Regex;
use reqwest::{Client, StatusCode};
use scraper::Html;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::checkpoint::write_atomic;
use crate::proxy::ProxyList;
use crate::webster::parse::create_selector;
use crate::{info_time, Result, DICTIONARY_HOME};

const SPYS_URL: &str = "https://spys.me/proxy.txt";
const FREE_PROXY_LIST_URL: &str = "https://free-proxy-list.net/";
const SOURCE_TIMEOUT: Duration = Duration::from_secs(10);
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);
/// free-proxy-list.net renders 8 cells per row, ip and port come first.
const CELLS_PER_ROW: usize = 8;

/// Extracts every `ip:port` occurrence from the spys.me plain text list.
pub fn parse_spys(text: &str) -> Result<Vec<String>> {
    let re = Regex::new(r"[0-9]+(?:\.[0-9]+){3}:[0-9]+")?;
    Ok(re.find_iter(text).map(|m| m.as_str().to_string()).collect())
}

/// Extracts `ip:port` pairs from the free-proxy-list.net table.
pub fn parse_free_proxy_list(html: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(html);
    let cell_selector = create_selector(".fpl-list .table tbody tr td")?;
    let cells: Vec<String> = doc
        .select(&cell_selector)
        .map(|td| td.text().collect::<String>().trim().to_string())
        .collect();

    Ok(cells
        .chunks(CELLS_PER_ROW)
        .filter(|row| row.len() >= 2 && !row[0].is_empty() && !row[1].is_empty())
        .map(|row| format!("{}:{}", row[0], row[1]))
        .collect())
}

async fn fetch_source(client: &Client, url: &str) -> Result<String> {
    let text = client
        .get(url)
        .timeout(SOURCE_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(text)
}

/// Collects candidates from every known source. A failing source only logs.
pub async fn collect_candidates(client: &Client) -> BTreeSet<String> {
    let mut all = BTreeSet::new();

    match fetch_source(client, SPYS_URL).await.and_then(|t| parse_spys(&t)) {
        Ok(found) => {
            info_time!("Found {} proxies from spys.me", found.len());
            all.extend(found);
        }
        Err(e) => log::error!("Error fetching from spys.me: {e}"),
    }

    match fetch_source(client, FREE_PROXY_LIST_URL)
        .await
        .and_then(|t| parse_free_proxy_list(&t))
    {
        Ok(found) => {
            info_time!("Found {} proxies from free-proxy-list.net", found.len());
            all.extend(found);
        }
        Err(e) => log::error!("Error fetching from free-proxy-list: {e}"),
    }

    all
}

async fn is_responsive(address: &str) -> bool {
    let url = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    let Ok(proxy) = reqwest::Proxy::all(url) else {
        return false;
    };
    let Ok(client) = Client::builder()
        .proxy(proxy)
        .timeout(VALIDATION_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .build()
    else {
        return false;
    };

    matches!(
        client.get(DICTIONARY_HOME).send().await,
        Ok(res) if res.status() == StatusCode::OK
    )
}

/// Keeps the candidates that answer through to the dictionary home page.
pub async fn validate(candidates: impl IntoIterator<Item = String>, concurrency: usize) -> Vec<String> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut task_set = JoinSet::new();
    for address in candidates {
        let semaphore = Arc::clone(&semaphore);
        task_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let ok = is_responsive(&address).await;
            (address, ok)
        });
    }

    let mut working = Vec::new();
    while let Some(joined) = task_set.join_next().await {
        match joined {
            Ok((address, true)) => working.push(address),
            Ok((address, false)) => log::debug!("Proxy {address} failed validation"),
            Err(e) => log::warn!("Validation task failed: {e}"),
        }
    }
    working.sort();
    working
}

/// Harvests public proxies and writes them as a [`ProxyList`] to `output`.
/// Returns the number of proxies written.
pub async fn harvest_proxies(output: &Path, check: bool, concurrency: usize) -> Result<usize> {
    let start_time = Local::now();
    let client = Client::builder().build()?;

    let candidates = collect_candidates(&client).await;
    info_time!("Collected {} unique candidates", candidates.len());

    let proxies: Vec<String> = if check {
        let working = validate(candidates, concurrency).await;
        info_time!(start_time, "{} proxies passed validation", working.len());
        working
    } else {
        candidates.into_iter().collect()
    };

    let json = serde_json::to_vec_pretty(&ProxyList {
        proxies: proxies.clone(),
    })?;
    write_atomic(output, &json).await?;
    info_time!(start_time, "Saved {} proxies to {}", proxies.len(), output.display());

    Ok(proxies.len())
}
