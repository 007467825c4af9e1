//! Shared compiled-selector cache
//!
//! Subscriptions with the same selector share one compiled tree. Entries
//! hold weak references, so a selector is freed once its last subscription
//! goes away. Dead entries are purged whenever the maps have doubled since
//! the last purge, or explicitly through `purge()`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{CompileError, CompiledSelector, SelectorCompiler};
use crate::config::SelectorConfig;

/// Entry count below which dead entries are left alone
const PURGE_FLOOR: usize = 64;

pub struct SelectorCache {
    compiler: SelectorCompiler,
    /// Selector text as written
    by_text: DashMap<String, Weak<CompiledSelector>>,
    /// Canonical tree, so differently written equal selectors intern together
    by_tree: DashMap<CompiledSelector, Weak<CompiledSelector>>,
    /// Maximum live text entries (0 = unlimited)
    capacity: usize,
    /// Entry count that triggers the next automatic purge
    purge_at: AtomicUsize,
}

impl SelectorCache {
    pub fn new(compiler: SelectorCompiler, capacity: usize) -> Self {
        Self {
            compiler,
            by_text: DashMap::new(),
            by_tree: DashMap::new(),
            capacity,
            purge_at: AtomicUsize::new(PURGE_FLOOR),
        }
    }

    /// Cache using the configured extensions and limits
    pub fn from_config(config: &SelectorConfig) -> Result<Self, CompileError> {
        Ok(Self::new(SelectorCompiler::new(config)?, config.cache_capacity))
    }

    pub fn compiler(&self) -> &SelectorCompiler {
        &self.compiler
    }

    /// Return the shared compiled form of `text`, compiling it if needed
    pub fn get_or_compile(&self, text: &str) -> Result<Arc<CompiledSelector>, CompileError> {
        if let Some(existing) = self.by_text.get(text).and_then(|w| w.upgrade()) {
            return Ok(existing);
        }

        let selector = self.intern(self.compiler.compile(text)?);

        if self.capacity > 0 && self.by_text.len() >= self.capacity {
            self.purge();
        }
        if self.capacity == 0 || self.by_text.len() < self.capacity {
            self.by_text
                .insert(text.to_string(), Arc::downgrade(&selector));
        }
        self.maybe_purge();
        Ok(selector)
    }

    /// Return the shared instance structurally equal to `selector`
    pub fn intern(&self, selector: CompiledSelector) -> Arc<CompiledSelector> {
        match self.by_tree.entry(selector) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(entry.key().clone());
                    entry.insert(Arc::downgrade(&fresh));
                    fresh
                }
            },
            Entry::Vacant(entry) => {
                let fresh = Arc::new(entry.key().clone());
                entry.insert(Arc::downgrade(&fresh));
                fresh
            }
        }
    }

    fn entries(&self) -> usize {
        self.by_text.len() + self.by_tree.len()
    }

    fn maybe_purge(&self) {
        if self.entries() < self.purge_at.load(Ordering::Relaxed) {
            return;
        }
        self.purge();
        let next = (self.entries() * 2).max(PURGE_FLOOR);
        self.purge_at.store(next, Ordering::Relaxed);
    }

    /// Drop entries whose selector is no longer referenced; returns how many were removed
    pub fn purge(&self) -> usize {
        let before = self.by_text.len() + self.by_tree.len();
        self.by_text.retain(|_, weak| weak.strong_count() > 0);
        self.by_tree.retain(|_, weak| weak.strong_count() > 0);
        let removed = before - (self.by_text.len() + self.by_tree.len());
        if removed > 0 {
            debug!(removed, "purged unused selectors");
        }
        removed
    }

    /// Number of distinct live compiled selectors
    pub fn len(&self) -> usize {
        self.by_tree
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SelectorCache {
    fn default() -> Self {
        Self::new(SelectorCompiler::default(), 0)
    }
}
