//! Mechanism registry shared by all three role engines.
//!
//! Stores an append-only sequence of entries per capability; lookup scans in
//! registration order with exact network containment taking precedence over
//! pattern matches. Reads and writes are internally synchronized so
//! registration after startup is safe, and dispatch resolves a shared
//! reference under a read lock that is released before the mechanism runs.

use std::sync::{Arc, RwLock};

use crate::network::{Network, NetworkPattern};

/// A single registration: one mechanism bound to a scheme and a set of
/// networks.
#[derive(Debug)]
pub struct RegistryEntry<M: ?Sized> {
    /// The scheme this entry serves.
    pub scheme: String,
    /// The networks this entry was registered for.
    pub networks: Vec<Network>,
    /// The derived match pattern: a namespace wildcard when every registered
    /// network shares one namespace, the first concrete network otherwise.
    pub pattern: NetworkPattern,
    /// The registered mechanism.
    pub mechanism: Arc<M>,
}

impl<M: ?Sized> Clone for RegistryEntry<M> {
    fn clone(&self) -> Self {
        Self {
            scheme: self.scheme.clone(),
            networks: self.networks.clone(),
            pattern: self.pattern.clone(),
            mechanism: Arc::clone(&self.mechanism),
        }
    }
}

impl<M: ?Sized> RegistryEntry<M> {
    /// Returns `true` if this entry serves the given scheme and network.
    ///
    /// Either the network is in the registered set, or it matches the
    /// derived pattern (`ns:*` matches any `ns:x`).
    #[must_use]
    pub fn matches(&self, scheme: &str, network: &Network) -> bool {
        self.scheme == scheme
            && (self.networks.contains(network) || self.pattern.matches(network))
    }

    /// Returns `true` if the network is in the registered set exactly.
    fn contains(&self, scheme: &str, network: &Network) -> bool {
        self.scheme == scheme && self.networks.contains(network)
    }
}

/// Registry of scheme mechanisms keyed by `(scheme, network)`.
///
/// Duplicates are permitted; the first registration wins. A network whose
/// reference is `*` (e.g. `eip155:*`) registers the entry for an entire
/// namespace.
///
/// # Type Parameters
///
/// - `M` - The mechanism capability, typically a `dyn` trait
pub struct SchemeRegistry<M: ?Sized> {
    entries: RwLock<Vec<RegistryEntry<M>>>,
}

impl<M: ?Sized> std::fmt::Debug for SchemeRegistry<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slugs: Vec<String> = self
            .entries
            .read()
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| format!("{}@{}", e.scheme, e.pattern))
                    .collect()
            })
            .unwrap_or_default();
        f.debug_tuple("SchemeRegistry").field(&slugs).finish()
    }
}

impl<M: ?Sized> Default for SchemeRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ?Sized> SchemeRegistry<M> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Registers a mechanism for a scheme and a set of networks.
    ///
    /// Registration takes the write lock briefly and becomes visible to all
    /// subsequent lookups on all threads. Registering with an empty network
    /// set is a no-op.
    pub fn register(
        &self,
        scheme: impl Into<String>,
        networks: Vec<Network>,
        mechanism: Arc<M>,
    ) {
        let scheme = scheme.into();
        let Some(pattern) = derive_pattern(&networks) else {
            tracing::warn!(scheme, "ignoring mechanism registration with no networks");
            return;
        };
        let entry = RegistryEntry {
            scheme,
            networks,
            pattern,
            mechanism,
        };
        self.entries
            .write()
            .expect("scheme registry lock poisoned")
            .push(entry);
    }

    /// Looks up the mechanism serving `(scheme, network)`.
    ///
    /// Scans entries in registration order twice: first for exact network
    /// containment, then for pattern matches, so an exact registration takes
    /// precedence over a wildcard one regardless of order. Returns a clone
    /// of the mechanism's `Arc`; the read lock is released before return, so
    /// callers invoke the mechanism without holding the lock.
    #[must_use]
    pub fn lookup(&self, scheme: &str, network: &Network) -> Option<Arc<M>> {
        let entries = self
            .entries
            .read()
            .expect("scheme registry lock poisoned");
        entries
            .iter()
            .find(|e| e.contains(scheme, network))
            .or_else(|| entries.iter().find(|e| e.matches(scheme, network)))
            .map(|e| Arc::clone(&e.mechanism))
    }

    /// Looks up the mechanism serving `(scheme, network)` among entries whose
    /// mechanism satisfies the predicate.
    ///
    /// Same precedence as [`lookup`](Self::lookup): exact containment first,
    /// then pattern matches, both in registration order.
    #[must_use]
    pub fn lookup_where(
        &self,
        scheme: &str,
        network: &Network,
        pred: impl Fn(&M) -> bool,
    ) -> Option<Arc<M>> {
        let entries = self
            .entries
            .read()
            .expect("scheme registry lock poisoned");
        entries
            .iter()
            .find(|e| e.contains(scheme, network) && pred(&e.mechanism))
            .or_else(|| {
                entries
                    .iter()
                    .find(|e| e.matches(scheme, network) && pred(&e.mechanism))
            })
            .map(|e| Arc::clone(&e.mechanism))
    }

    /// Returns `true` if any entry serves `(scheme, network)`.
    #[must_use]
    pub fn supports(&self, scheme: &str, network: &Network) -> bool {
        self.entries
            .read()
            .expect("scheme registry lock poisoned")
            .iter()
            .any(|e| e.matches(scheme, network))
    }

    /// Returns a snapshot of all entries in registration order.
    #[must_use]
    pub fn entries(&self) -> Vec<RegistryEntry<M>> {
        self.entries
            .read()
            .expect("scheme registry lock poisoned")
            .clone()
    }

    /// Returns the number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("scheme registry lock poisoned")
            .len()
    }

    /// Returns `true` if no entries are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Derives the entry pattern from the registered network set: a namespace
/// wildcard when all networks share one namespace, the first concrete
/// network otherwise. Returns `None` for an empty set.
fn derive_pattern(networks: &[Network]) -> Option<NetworkPattern> {
    let first = networks.first()?;
    let namespace = first.namespace();
    if networks.iter().all(|n| n.namespace() == namespace) {
        Some(NetworkPattern::wildcard(namespace))
    } else {
        Some(NetworkPattern::exact(namespace, first.reference()))
    }
}
