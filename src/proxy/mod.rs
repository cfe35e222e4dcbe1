//! Proxy rotation: the shared [`ProxyPool`], the proxy list file format and the harvester
//! that produces it.

pub mod harvest;
mod pool;
mod source;

pub use pool::{Proxy, ProxyPool};
pub use source::{load_proxy_addresses, ProxyList};
