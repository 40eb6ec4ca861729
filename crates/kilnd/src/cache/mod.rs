//! Cache registries handed to incremental compilations.
//!
//! A registry maps module identifiers to [`IncrementalCache`] handles. The
//! handles a daemon call sees are usually [`RemoteCacheHandle`]s: proxies
//! whose every query is a round trip to the caller over the call's
//! connection, serialised through a [`CacheBridge`].

mod bridge;
mod registry;
mod remote;

use kiln_protocol::{CacheError, IncrementalCache};

pub(crate) use bridge::CacheBridge;
pub use registry::CacheRegistry;
pub(crate) use remote::RemoteCacheHandle;

/// Incremental components of one call.
pub trait IncrementalComponents {
    /// Handle registered for `module`; exact match only.
    fn incremental_cache(&self, module: &str) -> Option<&dyn IncrementalCache>;

    /// Closes every handle that is still open. Calling it again is a no-op.
    fn close_all(&self) -> Result<(), CacheError>;
}

/// Registry of proxies talking to the caller through `bridge`.
pub(crate) fn remote_registry<'a, I>(
    bridge: &'a CacheBridge<'a>,
    modules: I,
) -> CacheRegistry<RemoteCacheHandle<'a>>
where
    I: IntoIterator<Item = String>,
{
    modules
        .into_iter()
        .map(|module| {
            let handle = RemoteCacheHandle::new(module.clone(), bridge);
            (module, handle)
        })
        .collect()
}
