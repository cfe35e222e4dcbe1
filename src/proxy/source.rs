use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// On-disk proxy list: `{ "proxies": ["1.2.3.4:8080", ...] }`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProxyList {
    pub proxies: Vec<String>,
}

/// Reads proxy addresses from `path`.
///
/// JSON files use the [`ProxyList`] shape; anything else is read as one address per line.
/// A missing, unreadable or empty source is reported as [`Error::EmptyPool`].
pub async fn load_proxy_addresses(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::EmptyPool(format!("{}: {e}", path.display())))?;

    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let addresses = if is_json {
        serde_json::from_str::<ProxyList>(&content)
            .map_err(|e| Error::EmptyPool(format!("{}: {e}", path.display())))?
            .proxies
    } else {
        content.lines().map(str::to_string).collect()
    };

    let addresses: Vec<String> = addresses
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();

    if addresses.is_empty() {
        return Err(Error::EmptyPool(format!("{} lists no proxies", path.display())));
    }
    log::info!("Loaded {} proxies from {}", addresses.len(), path.display());
    Ok(addresses)
}
