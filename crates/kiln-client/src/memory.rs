//! In-memory cache handles for callers that keep build state in process.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use kiln_protocol::{CacheError, IncrementalCache};

/// Cache handles lent to an incremental call, keyed by module identifier.
pub type LocalCaches = BTreeMap<String, Arc<dyn IncrementalCache>>;

/// Cache handle backed by maps held in memory.
#[derive(Debug)]
pub struct MemoryCache {
    module: String,
    obsolete: BTreeSet<String>,
    units: BTreeMap<String, Vec<u8>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MemoryCache {
    /// Empty cache for `module`.
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            obsolete: BTreeSet::new(),
            units: BTreeMap::new(),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Records package data for `fq_name`.
    #[must_use]
    pub fn with_unit(mut self, fq_name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.units.insert(fq_name.into(), data.into());
        self
    }

    /// Marks `fq_name` as obsolete.
    #[must_use]
    pub fn with_obsolete(mut self, fq_name: impl Into<String>) -> Self {
        self.obsolete.insert(fq_name.into());
        self
    }

    /// Module this cache belongs to.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns `true` once the handle has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of times `close` was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.is_closed() {
            return Err(CacheError::Closed {
                module: self.module.clone(),
            });
        }
        Ok(())
    }
}

impl IncrementalCache for MemoryCache {
    fn obsolete_package_parts(&self) -> Result<BTreeSet<String>, CacheError> {
        self.ensure_open()?;
        Ok(self.obsolete.clone())
    }

    fn package_data(&self, fq_name: &str) -> Result<Vec<u8>, CacheError> {
        self.ensure_open()?;
        if self.obsolete.contains(fq_name) {
            return Err(CacheError::Obsolete {
                fq_name: fq_name.to_owned(),
            });
        }
        self.units
            .get(fq_name)
            .cloned()
            .ok_or_else(|| CacheError::handle(format!("no package data for {fq_name}")))
    }

    fn close(&self) -> Result<(), CacheError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
