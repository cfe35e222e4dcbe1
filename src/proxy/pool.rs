use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;

use crate::config::PoolConfig;
use crate::{Error, Result};

/// A proxy handed out by [`ProxyPool::acquire`].
///
/// `slot` is the proxy's position in the pool's table, so reporting back is an index
/// lookup rather than a search by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    slot: usize,
    address: Arc<str>,
}

impl Proxy {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The address as a URL reqwest understands. Bare `host:port` entries are treated as http.
    pub fn url(&self) -> String {
        if self.address.contains("://") {
            self.address.to_string()
        } else {
            format!("http://{}", self.address)
        }
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

#[derive(Debug)]
struct Slot {
    address: Arc<str>,
    healthy: bool,
    last_used: Option<Instant>,
}

impl Slot {
    fn cooled_down(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_used
            .map_or(true, |used| now.duration_since(used) >= cooldown)
    }
}

#[derive(Debug)]
struct PoolState {
    slots: Vec<Slot>,
    cursor: usize,
}

impl PoolState {
    /// Scans one full cycle from the cursor and claims the first slot matching `eligible`.
    fn claim(&mut self, now: Instant, eligible: impl Fn(&Slot) -> bool) -> Option<usize> {
        let len = self.slots.len();
        for _ in 0..len {
            let idx = self.cursor;
            self.cursor = (self.cursor + 1) % len;
            if eligible(&self.slots[idx]) {
                self.slots[idx].last_used = Some(now);
                return Some(idx);
            }
        }
        None
    }

    fn heal_all(&mut self) {
        for slot in &mut self.slots {
            slot.healthy = true;
        }
    }

    fn healthy_count(&self) -> usize {
        self.slots.iter().filter(|s| s.healthy).count()
    }
}

/// Round-robin proxy rotation with per-proxy cooldown and health tracking.
///
/// All state sits behind a single mutex which is only ever held for a scan of the slot
/// table, so `acquire` and `report` can be called from any number of workers.
#[derive(Debug)]
pub struct ProxyPool {
    state: Mutex<PoolState>,
    cooldown: Duration,
}

impl ProxyPool {
    /// Builds a pool from `addresses` in shuffled order.
    pub fn new<I, S>(addresses: I, config: &PoolConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut slots: Vec<Slot> = addresses
            .into_iter()
            .map(|a| a.into().trim().to_string())
            .filter(|a| !a.is_empty())
            .map(|a| Slot {
                address: a.into(),
                healthy: true,
                last_used: None,
            })
            .collect();
        if slots.is_empty() {
            return Err(Error::EmptyPool("empty proxy list".into()));
        }
        slots.shuffle(&mut rand::thread_rng());

        Ok(ProxyPool {
            state: Mutex::new(PoolState { slots, cursor: 0 }),
            cooldown: config.cooldown,
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Picks the next healthy proxy that is out of its cooldown.
    ///
    /// When a full cycle finds nothing, the cooldown is relaxed for one more pass. If no
    /// proxy is healthy at all, every proxy is marked healthy first. This never blocks and
    /// always returns a proxy.
    pub fn acquire(&self) -> Proxy {
        let mut state = self.lock();
        let now = Instant::now();
        let cooldown = self.cooldown;

        let idx = match state.claim(now, |s| s.healthy && s.cooled_down(now, cooldown)) {
            Some(idx) => idx,
            None => {
                if state.healthy_count() == 0 {
                    log::warn!("All proxies marked as failed, resetting pool.");
                    state.heal_all();
                }
                // At least one slot is healthy here, so the relaxed pass can't miss.
                state.claim(now, |s| s.healthy).unwrap_or(0)
            }
        };

        Proxy {
            slot: idx,
            address: Arc::clone(&state.slots[idx].address),
        }
    }

    /// Feeds the outcome of a request back into the pool.
    pub fn report(&self, proxy: &Proxy, success: bool) {
        let mut state = self.lock();
        let Some(slot) = state.slots.get_mut(proxy.slot) else {
            return;
        };
        slot.healthy = success;

        if !success && state.healthy_count() == 0 {
            log::warn!("Last healthy proxy failed ({proxy}), resetting pool.");
            state.heal_all();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn healthy_count(&self) -> usize {
        self.lock().healthy_count()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn pool(n: usize, cooldown_ms: u64) -> ProxyPool {
        let config = PoolConfig {
            cooldown: Duration::from_millis(cooldown_ms),
        };
        ProxyPool::new((0..n).map(|i| format!("10.0.0.{i}:8080")), &config).unwrap()
    }

    fn is_healthy(pool: &ProxyPool, proxy: &Proxy) -> bool {
        pool.lock().slots[proxy.slot].healthy
    }

    #[test]
    fn empty_list_is_rejected() {
        let err = ProxyPool::new(Vec::<String>::new(), &PoolConfig::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyPool(_)));

        let err = ProxyPool::new(["  ", ""], &PoolConfig::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyPool(_)));
    }

    #[test]
    fn shuffle_keeps_every_address() {
        let pool = pool(20, 0);
        let seen: HashSet<String> = (0..20).map(|_| pool.acquire().url()).collect();
        assert_eq!(seen.len(), 20);
        assert!(seen.contains("http://10.0.0.7:8080"));
    }

    #[test]
    fn round_robin_visits_each_proxy_once_per_cycle() {
        let pool = pool(4, 0);
        let first: Vec<usize> = (0..4).map(|_| pool.acquire().slot()).collect();
        let second: Vec<usize> = (0..4).map(|_| pool.acquire().slot()).collect();
        assert_eq!(first, second);
        assert_eq!(first.iter().collect::<HashSet<_>>().len(), 4);
    }

    #[test]
    fn unhealthy_proxies_are_skipped() {
        let pool = pool(3, 0);
        let bad = pool.acquire();
        pool.report(&bad, false);
        for _ in 0..30 {
            assert_ne!(pool.acquire().slot(), bad.slot());
        }
        pool.report(&bad, true);
        assert!((0..3).any(|_| pool.acquire().slot() == bad.slot()));
    }

    #[test]
    fn all_failed_one_by_one_resets_pool() {
        let pool = pool(5, 0);
        let proxies: Vec<Proxy> = (0..5).map(|_| pool.acquire()).collect();
        for (n, proxy) in proxies.iter().enumerate() {
            pool.report(proxy, false);
            if n < 4 {
                assert_eq!(pool.healthy_count(), 4 - n);
            }
        }
        assert_eq!(pool.healthy_count(), 5);
        let next = pool.acquire();
        assert!(is_healthy(&pool, &next));
    }

    #[test]
    fn cooldown_is_relaxed_instead_of_blocking() {
        let pool = pool(2, 60_000);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a.slot(), b.slot());
        // Both are cooling down, a third call still returns a healthy proxy.
        let c = pool.acquire();
        assert!(is_healthy(&pool, &c));
    }

    #[test]
    fn cooldown_prefers_rested_proxy() {
        let pool = pool(3, 60_000);
        let a = pool.acquire();
        pool.report(&a, true);
        let b = pool.acquire();
        let c = pool.acquire();
        let all: HashSet<usize> = [a.slot(), b.slot(), c.slot()].into_iter().collect();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn never_hands_out_unhealthy_while_one_is_healthy() {
        let pool = pool(6, 0);
        let proxies: Vec<Proxy> = (0..6).map(|_| pool.acquire()).collect();
        for proxy in &proxies[..5] {
            pool.report(proxy, false);
        }
        for _ in 0..20 {
            let p = pool.acquire();
            assert_eq!(p.slot(), proxies[5].slot());
            assert!(is_healthy(&pool, &p));
        }
    }

    #[test]
    fn concurrent_use_is_safe() {
        let pool = Arc::new(pool(8, 0));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for n in 0..500 {
                        let p = pool.acquire();
                        pool.report(&p, (n + i) % 3 != 0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(pool.healthy_count() >= 1);
    }

    #[test]
    fn url_keeps_explicit_scheme() {
        let pool = ProxyPool::new(["socks5://1.2.3.4:1080"], &PoolConfig::default()).unwrap();
        assert_eq!(pool.acquire().url(), "socks5://1.2.3.4:1080");
    }
}
