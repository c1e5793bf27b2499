//! Registry of named source containers.
//!
//! The pool holds one `Arc` per container. Holders clone that `Arc`; when a
//! holder lets go it calls [`SourcePool::check_source_released`], which drops
//! the pool's entry once nobody else holds it. Names are unique: forks and
//! colliding creates pick a fresh `name (k)`.
//!
//! All methods block on a pool-wide lock and belong on control threads.

use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::container::{SourceContainer, SourceType};
use crate::error::{Result, SourceError};

/// Prefix of synthesized names.
pub const UNNAMED_PREFIX: &str = "New Source #";

/// Name-keyed, reference-counted source registry.
#[derive(Debug, Default)]
pub struct SourcePool {
    sources: RwLock<BTreeMap<String, Arc<SourceContainer>>>,
    counter: AtomicU64,
}

impl SourcePool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the container called `name`, creating an empty one if absent.
    ///
    /// Fails with [`SourceError::NameConflict`] if `name` holds the other type.
    pub fn add(&self, name: &str, kind: SourceType) -> Result<Arc<SourceContainer>> {
        let mut sources = self.sources.write();
        if let Some(existing) = sources.get(name) {
            if existing.kind() != kind {
                tracing::warn!(
                    "source_pool: {name} exists as {}, requested {kind}",
                    existing.kind()
                );
                return Err(SourceError::NameConflict(name.to_string()));
            }
            return Ok(Arc::clone(existing));
        }
        let container = Arc::new(SourceContainer::new(name, kind));
        sources.insert(name.to_string(), Arc::clone(&container));
        tracing::debug!("source_pool: added {kind} source {name}");
        Ok(container)
    }

    /// Creates a new container the caller owns privately.
    ///
    /// An empty `name` gets a synthesized `New Source #N`. A taken name is
    /// forked, so the result never aliases another holder's content.
    pub fn create(&self, name: &str, kind: SourceType) -> Result<Arc<SourceContainer>> {
        let mut sources = self.sources.write();
        if name.is_empty() {
            let name = loop {
                let n = self.counter.fetch_add(1, Ordering::Relaxed);
                let candidate = format!("{UNNAMED_PREFIX}{n}");
                if !sources.contains_key(&candidate) {
                    break candidate;
                }
            };
            let container = Arc::new(SourceContainer::new(name.clone(), kind));
            sources.insert(name, Arc::clone(&container));
            return Ok(container);
        }

        match sources.get(name).cloned() {
            Some(existing) if existing.kind() != kind => {
                Err(SourceError::NameConflict(name.to_string()))
            }
            Some(existing) => Ok(Self::fork_locked(&mut sources, &existing)),
            None => {
                let container = Arc::new(SourceContainer::new(name, kind));
                sources.insert(name.to_string(), Arc::clone(&container));
                Ok(container)
            }
        }
    }

    /// Deep-copies the container called `name` under a fresh name.
    pub fn fork(&self, name: &str) -> Option<Arc<SourceContainer>> {
        let mut sources = self.sources.write();
        let existing = sources.get(name).cloned()?;
        Some(Self::fork_locked(&mut sources, &existing))
    }

    fn fork_locked(
        sources: &mut BTreeMap<String, Arc<SourceContainer>>,
        existing: &SourceContainer,
    ) -> Arc<SourceContainer> {
        let name = unique_name(sources, existing.name());
        let copy = Arc::new(existing.duplicate_as(name.clone()));
        tracing::debug!("source_pool: forked {} as {name}", existing.name());
        sources.insert(name, Arc::clone(&copy));
        copy
    }

    /// Looks up a container.
    pub fn find(&self, name: &str) -> Option<Arc<SourceContainer>> {
        self.sources.read().get(name).cloned()
    }

    /// Drops the pool's entry for `name` if the pool is its last holder.
    /// Returns `true` if the entry was removed.
    pub fn check_source_released(&self, name: &str) -> bool {
        let mut sources = self.sources.write();
        let orphaned = sources
            .get(name)
            .is_some_and(|c| Arc::strong_count(c) == 1);
        if orphaned {
            sources.remove(name);
            tracing::debug!("source_pool: released {name}");
        }
        orphaned
    }

    /// Number of containers.
    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    /// All names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.sources.read().keys().cloned().collect()
    }
}

fn unique_name(sources: &BTreeMap<String, Arc<SourceContainer>>, base: &str) -> String {
    if !sources.contains_key(base) {
        return base.to_string();
    }
    (1u64..)
        .map(|k| format!("{base} ({k})"))
        .find(|candidate| !sources.contains_key(candidate))
        .unwrap_or_else(|| base.to_string())
}
