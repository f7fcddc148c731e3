//! Process-wide store of completed tokens and in-flight contexts.
//!
//! Two independent maps, both keyed by [`NegotiationKey`]:
//!
//! - completed tokens, reused by pre-authentication;
//! - security contexts still waiting for the server's next challenge.
//!
//! Entries expire once they have been idle longer than their TTL. A
//! background task sweeps both maps at a fixed interval and disposes every
//! context it removes.

use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{CacheConfig, Mechanism, SecurityContext};
use crate::error;
use crate::Result;

/// Identifies a negotiation: connection identity, target host and user.
///
/// Components compare case-insensitively. The encoded forms prefix every
/// component with its length, so distinct tuples never collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NegotiationKey {
    connection: String,
    host: String,
    user: String,
}

impl NegotiationKey {
    pub fn new(connection: &str, host: &str, user: &str) -> NegotiationKey {
        NegotiationKey {
            connection: connection.to_lowercase(),
            host: host.to_lowercase(),
            user: user.to_lowercase(),
        }
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Key of the token map.
    pub fn token_key(&self) -> String {
        encode(&["token", &self.connection, &self.host, &self.user])
    }

    /// Key of the context map; a user may negotiate several mechanisms with
    /// the same host at once.
    pub fn context_key(&self, mechanism: Mechanism) -> String {
        let mechanism = mechanism.scheme().to_lowercase();
        encode(&["context", &self.connection, &self.host, &self.user, &mechanism])
    }
}

fn encode(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts {
        let _ = write!(out, "{}:{};", part.len(), part);
    }
    out
}

struct CacheEntry<T> {
    value: T,
    last_used: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> CacheEntry<T> {
        CacheEntry {
            value,
            last_used: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_used) > ttl
    }
}

/// Counts of entries removed by one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Evicted {
    pub tokens: usize,
    pub contexts: usize,
}

/// Concurrent, time-bounded negotiation cache.
///
/// Cloning is cheap and shares the same store. The cache owns every context
/// it holds; callers borrow them through `Arc` while the entry exists, and
/// only removal from the cache disposes a context.
#[derive(Clone)]
pub struct NegotiationCache {
    inner: Arc<Inner>,
}

struct Inner {
    config: CacheConfig,
    tokens: DashMap<String, CacheEntry<String>>,
    contexts: DashMap<String, CacheEntry<Arc<SecurityContext>>>,
    sweeping: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Default for NegotiationCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl NegotiationCache {
    /// Creates an empty cache. No sweep runs until [`start`](Self::start).
    pub fn new(config: CacheConfig) -> NegotiationCache {
        NegotiationCache {
            inner: Arc::new(Inner {
                config,
                tokens: DashMap::new(),
                contexts: DashMap::new(),
                sweeping: AtomicBool::new(false),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // --- Tokens ---

    /// Returns the completed token for `key`, refreshing its idle time.
    pub fn get_token(&self, key: &NegotiationKey) -> Option<String> {
        let k = key.token_key();
        let token = self.inner.tokens.get_mut(&k).map(|mut entry| {
            entry.touch();
            entry.value.clone()
        });

        log::trace!(
            "NegotiationCache::get_token host:{} user:{} hit:{}",
            key.host(),
            key.user(),
            token.is_some()
        );

        token
    }

    pub fn set_token(&self, key: &NegotiationKey, token: impl Into<String>) {
        log::trace!("NegotiationCache::set_token host:{} user:{}", key.host(), key.user());
        self.inner
            .tokens
            .insert(key.token_key(), CacheEntry::new(token.into()));
    }

    pub fn delete_token(&self, key: &NegotiationKey) {
        let removed = self.inner.tokens.remove(&key.token_key());
        log::trace!(
            "NegotiationCache::delete_token host:{} user:{} removed:{}",
            key.host(),
            key.user(),
            removed.is_some()
        );
    }

    // --- Contexts ---

    /// Returns the context cached for `key` and `mechanism`, creating it with
    /// `factory` if there is none.
    ///
    /// The factory runs without holding any map lock. When two callers race
    /// on the same key, the first insert wins and every caller receives that
    /// instance; a losing caller disposes the context it created.
    pub fn get_or_create_context<F>(
        &self,
        key: &NegotiationKey,
        mechanism: Mechanism,
        factory: F,
    ) -> Result<Arc<SecurityContext>>
    where
        F: FnOnce() -> Result<SecurityContext>,
    {
        let k = key.context_key(mechanism);

        if let Some(mut entry) = self.inner.contexts.get_mut(&k) {
            entry.touch();
            return Ok(entry.value.clone());
        }

        let created = Arc::new(factory()?);

        let winner = match self.inner.contexts.entry(k) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().touch();
                occupied.get().value.clone()
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(created.clone()));
                log::trace!(
                    "NegotiationCache::get_or_create_context created host:{} user:{} mechanism:{}",
                    key.host(),
                    key.user(),
                    mechanism
                );
                return Ok(created);
            }
        };

        log::trace!(
            "NegotiationCache::get_or_create_context lost creation race host:{} user:{} mechanism:{}",
            key.host(),
            key.user(),
            mechanism
        );
        created.dispose();

        Ok(winner)
    }

    /// Removes the context for `key` and `mechanism` and disposes it before
    /// returning.
    pub fn delete_context(&self, key: &NegotiationKey, mechanism: Mechanism) {
        let removed = self.inner.contexts.remove(&key.context_key(mechanism));

        log::trace!(
            "NegotiationCache::delete_context host:{} user:{} mechanism:{} removed:{}",
            key.host(),
            key.user(),
            mechanism,
            removed.is_some()
        );

        if let Some((_, entry)) = removed {
            entry.value.dispose();
        }
    }

    /// Removes the context for `key` and `mechanism` only if the entry is
    /// still `context`, and disposes it. Returns whether it was removed.
    ///
    /// An entry that was evicted and replaced by another negotiation in the
    /// meantime is left alone.
    pub fn delete_context_if(
        &self,
        key: &NegotiationKey,
        mechanism: Mechanism,
        context: &Arc<SecurityContext>,
    ) -> bool {
        let removed = self
            .inner
            .contexts
            .remove_if(&key.context_key(mechanism), |_, entry| {
                Arc::ptr_eq(&entry.value, context)
            });

        log::trace!(
            "NegotiationCache::delete_context_if host:{} user:{} mechanism:{} removed:{}",
            key.host(),
            key.user(),
            mechanism,
            removed.is_some()
        );

        match removed {
            Some((_, entry)) => {
                entry.value.dispose();
                true
            }
            None => false,
        }
    }

    pub fn token_count(&self) -> usize {
        self.inner.tokens.len()
    }

    pub fn context_count(&self) -> usize {
        self.inner.contexts.len()
    }

    // --- Eviction ---

    /// Removes every entry idle for longer than its TTL.
    ///
    /// Returns `None` without doing anything if another sweep is running.
    pub fn sweep(&self) -> Option<Evicted> {
        if self
            .inner
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::trace!("NegotiationCache::sweep already running, skipped");
            return None;
        }
        let _guard = SweepGuard(&self.inner.sweeping);

        let config = &self.inner.config;
        let evicted = Evicted {
            tokens: self.evict_tokens(Some(config.token_ttl)),
            contexts: self.evict_contexts(Some(config.context_ttl)),
        };

        if evicted != Evicted::default() {
            log::debug!(
                "NegotiationCache::sweep evicted tokens:{} contexts:{}",
                evicted.tokens,
                evicted.contexts
            );
        }

        Some(evicted)
    }

    /// Removes every token regardless of age.
    pub fn clear_tokens(&self) -> usize {
        self.evict_tokens(None)
    }

    /// Removes and disposes every context regardless of age.
    pub fn clear_contexts(&self) -> usize {
        self.evict_contexts(None)
    }

    fn evict_tokens(&self, ttl: Option<Duration>) -> usize {
        evict(&self.inner.tokens, ttl).len()
    }

    fn evict_contexts(&self, ttl: Option<Duration>) -> usize {
        let removed = evict(&self.inner.contexts, ttl);
        for context in &removed {
            context.dispose();
        }
        removed.len()
    }

    // --- Lifecycle ---

    /// Spawns the recurring sweep on the current tokio runtime.
    ///
    /// Calling it again while the sweeper runs has no effect.
    ///
    /// # Errors
    ///
    /// A configuration error if called outside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut sweeper = self.inner.sweeper.lock();
        if sweeper.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(error::config)?;
        let period = self.inner.config.sweep_interval;
        let weak = Arc::downgrade(&self.inner);

        *sweeper = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                NegotiationCache { inner }.sweep();
            }
        }));

        log::debug!("NegotiationCache sweeper started, interval:{period:?}");
        Ok(())
    }

    /// Stops the recurring sweep and evicts everything, disposing every
    /// cached context.
    pub fn close(&self) {
        if let Some(task) = self.inner.sweeper.lock().take() {
            task.abort();
        }

        let tokens = self.clear_tokens();
        let contexts = self.clear_contexts();
        log::debug!("NegotiationCache closed, evicted tokens:{tokens} contexts:{contexts}");
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .sweeper
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

/// Removes entries idle longer than `ttl`, or all of them when `ttl` is
/// `None`, and hands back the removed values.
///
/// Keys are collected first so no shard lock is held while values are
/// released; the idle check is repeated at removal in case an entry was
/// refreshed in between.
fn evict<T>(map: &DashMap<String, CacheEntry<T>>, ttl: Option<Duration>) -> Vec<T> {
    let now = Instant::now();
    let expired = |entry: &CacheEntry<T>| ttl.map_or(true, |ttl| entry.is_idle(now, ttl));

    let keys: Vec<String> = map
        .iter()
        .filter(|entry| expired(entry.value()))
        .map(|entry| entry.key().clone())
        .collect();

    keys.into_iter()
        .filter_map(|key| map.remove_if(&key, |_, entry| expired(entry)))
        .map(|(_, entry)| entry.value)
        .collect()
}

struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.sweeper.get_mut().take() {
            task.abort();
        }
    }
}

impl fmt::Debug for NegotiationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationCache")
            .field("config", &self.inner.config)
            .field("tokens", &self.inner.tokens.len())
            .field("contexts", &self.inner.contexts.len())
            .finish()
    }
}
