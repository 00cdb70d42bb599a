//! Keyed provider cache.
//!
//! Holds at most one provider per service key. Providers are built outside
//! the lock, so a slow exporter setup for one service never blocks lookups
//! for another. When two callers race to build the same key, the first to
//! re-acquire the lock wins and the other's candidate is shut down.
//!
//! A disabled outcome (no endpoint configured) is cached like a real
//! provider, so the factory runs at most once per key either way. Only
//! [`ProviderCache::get_or_enable`] looks past a cached disabled entry.

use crate::provider::{Provider, SignalKind};
use parking_lot::Mutex;
use std::collections::HashMap;

/// How a [`ProviderCache::get_or_create`] call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The key was already cached; the factory did not run.
    Cached,
    /// This call's factory result was inserted.
    Created,
    /// The factory ran but another caller inserted first; the candidate
    /// was discarded.
    Raced,
}

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub struct Resolved<P> {
    /// The canonical provider for the key, `None` when export is disabled.
    pub provider: Option<P>,
    /// How the lookup was resolved.
    pub origin: Origin,
}

impl<P> Resolved<P> {
    /// Whether this call created the canonical provider.
    ///
    /// Exactly one caller per live provider sees `true`; that caller owns
    /// registering its shutdown.
    pub fn is_new_provider(&self) -> bool {
        self.origin == Origin::Created && self.provider.is_some()
    }

    /// Drop the origin.
    pub fn into_provider(self) -> Option<P> {
        self.provider
    }
}

/// Map from service key to provider, one map per signal kind.
pub struct ProviderCache<P> {
    entries: Mutex<HashMap<String, Option<P>>>,
}

impl<P> Default for ProviderCache<P> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<P: Provider> std::fmt::Debug for ProviderCache<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCache")
            .field("kind", &P::KIND)
            .field("entries", &self.len())
            .finish()
    }
}

impl<P: Provider> ProviderCache<P> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal kind of the cached providers.
    pub fn kind(&self) -> SignalKind {
        P::KIND
    }

    /// Return the provider for `key`, building it with `create` on a miss.
    ///
    /// `create` runs without the lock held. Its error is returned as is and
    /// leaves the cache untouched. `Ok(None)` from `create` is the disabled
    /// sentinel and is cached.
    ///
    /// When another caller inserted first, the candidate built here is shut
    /// down on the calling thread with the SDK's blocking `shutdown()`. A
    /// batching provider's shutdown waits on its Tokio worker task, so call
    /// this from a multi-thread runtime; on a current-thread runtime the
    /// discard can block forever.
    pub fn get_or_create<E, F>(&self, key: &str, create: F) -> Result<Resolved<P>, E>
    where
        F: FnOnce() -> Result<Option<P>, E>,
    {
        self.resolve(key, false, create)
    }

    /// Like [`get_or_create`](Self::get_or_create), but a cached disabled
    /// entry counts as a miss.
    ///
    /// Used for requests that carry a live endpoint: a service that booted
    /// with export off can still get a provider once one is configured. A
    /// live entry is never replaced.
    pub fn get_or_enable<E, F>(&self, key: &str, create: F) -> Result<Resolved<P>, E>
    where
        F: FnOnce() -> Result<Option<P>, E>,
    {
        self.resolve(key, true, create)
    }

    fn resolve<E, F>(&self, key: &str, replace_disabled: bool, create: F) -> Result<Resolved<P>, E>
    where
        F: FnOnce() -> Result<Option<P>, E>,
    {
        if let Some(provider) = self.entries.lock().get(key) {
            if provider.is_some() || !replace_disabled {
                return Ok(Resolved {
                    provider: provider.clone(),
                    origin: Origin::Cached,
                });
            }
        }

        let candidate = create()?;

        let existing = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(None) if replace_disabled && candidate.is_some() => {
                    entries.insert(key.to_string(), candidate.clone());
                    None
                }
                Some(existing) => Some(existing.clone()),
                None => {
                    entries.insert(key.to_string(), candidate.clone());
                    None
                }
            }
        };

        let Some(existing) = existing else {
            if candidate.is_some() {
                tracing::debug!(
                    event = crate::logging::events::PROVIDER_CREATED,
                    kind = %P::KIND,
                    key = %key,
                    "cached new provider"
                );
            }
            return Ok(Resolved {
                provider: candidate,
                origin: Origin::Created,
            });
        };

        if let Some(candidate) = candidate {
            tracing::debug!(
                event = crate::logging::events::PROVIDER_DISCARDED,
                kind = %P::KIND,
                key = %key,
                "lost provider creation race, discarding candidate"
            );
            let _ = candidate.shutdown();
        }

        Ok(Resolved {
            provider: existing,
            origin: Origin::Raced,
        })
    }

    /// Look up `key` without creating anything.
    ///
    /// `Some(None)` means the key is cached as disabled.
    pub fn peek(&self, key: &str) -> Option<Option<P>> {
        self.entries.lock().get(key).cloned()
    }

    /// Number of cached keys, disabled ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry without shutting anything down.
    ///
    /// For test isolation; shut down providers you care about first.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
