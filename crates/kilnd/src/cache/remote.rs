//! Cache handle proxy backed by the caller's real handle.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use kiln_protocol::{CacheError, CacheOutcome, CacheQuery, IncrementalCache};

use super::CacheBridge;

/// Daemon-side stand-in for one caller-owned cache handle.
pub(crate) struct RemoteCacheHandle<'a> {
    module: String,
    bridge: &'a CacheBridge<'a>,
    closed: AtomicBool,
    obsolete: Mutex<BTreeSet<String>>,
}

impl<'a> RemoteCacheHandle<'a> {
    pub(crate) fn new(module: String, bridge: &'a CacheBridge<'a>) -> Self {
        Self {
            module,
            bridge,
            closed: AtomicBool::new(false),
            obsolete: Mutex::new(BTreeSet::new()),
        }
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Closed {
                module: self.module.clone(),
            });
        }
        Ok(())
    }

    fn known_obsolete(&self, fq_name: &str) -> bool {
        self.obsolete
            .lock()
            .map(|names| names.contains(fq_name))
            .unwrap_or(false)
    }
}

impl IncrementalCache for RemoteCacheHandle<'_> {
    fn obsolete_package_parts(&self) -> Result<BTreeSet<String>, CacheError> {
        self.ensure_open()?;
        match self
            .bridge
            .query(&self.module, CacheQuery::ObsoletePackageParts)?
        {
            CacheOutcome::Names { names } => {
                if let Ok(mut known) = self.obsolete.lock() {
                    known.clone_from(&names);
                }
                Ok(names)
            }
            CacheOutcome::Error { message } => Err(CacheError::handle(message)),
            CacheOutcome::Data { .. } => Err(CacheError::transport(
                "caller answered an obsolete part query with package data",
            )),
        }
    }

    fn package_data(&self, fq_name: &str) -> Result<Vec<u8>, CacheError> {
        self.ensure_open()?;
        if self.known_obsolete(fq_name) {
            return Err(CacheError::Obsolete {
                fq_name: fq_name.to_owned(),
            });
        }
        let query = CacheQuery::PackageData {
            fq_name: fq_name.to_owned(),
        };
        match self.bridge.query(&self.module, query)? {
            CacheOutcome::Data { data } => Ok(data),
            CacheOutcome::Error { message } => Err(CacheError::handle(message)),
            CacheOutcome::Names { .. } => Err(CacheError::transport(
                "caller answered a package data query with names",
            )),
        }
    }

    fn close(&self) -> Result<(), CacheError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.bridge.release(&self.module)
    }
}
