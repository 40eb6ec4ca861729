//! Per-call module to handle mapping with exactly-once close.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use kiln_protocol::{CacheError, IncrementalCache};

use super::IncrementalComponents;
use crate::dispatch::DISPATCH_TARGET;

/// Handles registered for one call, keyed by module identifier.
///
/// Handles are closed exactly once: by [`IncrementalComponents::close_all`],
/// or when the registry is dropped if that never happened.
#[derive(Debug)]
pub struct CacheRegistry<H: IncrementalCache> {
    handles: BTreeMap<String, H>,
    closed: AtomicBool,
}

impl<H: IncrementalCache> FromIterator<(String, H)> for CacheRegistry<H> {
    fn from_iter<I: IntoIterator<Item = (String, H)>>(iter: I) -> Self {
        Self {
            handles: iter.into_iter().collect(),
            closed: AtomicBool::new(false),
        }
    }
}

impl<H: IncrementalCache> IncrementalComponents for CacheRegistry<H> {
    fn incremental_cache(&self, module: &str) -> Option<&dyn IncrementalCache> {
        self.handles
            .get(module)
            .map(|handle| handle as &dyn IncrementalCache)
    }

    /// Closes every handle even if some fail; the first transport failure,
    /// or else the first failure of any kind, is returned.
    fn close_all(&self) -> Result<(), CacheError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut first: Option<CacheError> = None;
        for (module, handle) in &self.handles {
            match handle.close() {
                Ok(()) => debug!(target: DISPATCH_TARGET, module, "cache handle closed"),
                Err(error) => {
                    warn!(target: DISPATCH_TARGET, module, %error, "failed to close cache handle");
                    let replace = match &first {
                        None => true,
                        Some(existing) => !existing.is_transport() && error.is_transport(),
                    };
                    if replace {
                        first = Some(error);
                    }
                }
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl<H: IncrementalCache> Drop for CacheRegistry<H> {
    fn drop(&mut self) {
        if let Err(error) = self.close_all() {
            debug!(target: DISPATCH_TARGET, %error, "cache close failed while dropping registry");
        }
    }
}
