//! Mock cache handle.

use std::collections::BTreeSet;

use kiln_protocol::{CacheError, IncrementalCache};

mockall::mock! {
    pub IncrementalCache {}

    impl IncrementalCache for IncrementalCache {
        fn obsolete_package_parts(&self) -> Result<BTreeSet<String>, CacheError>;
        fn package_data(&self, fq_name: &str) -> Result<Vec<u8>, CacheError>;
        fn close(&self) -> Result<(), CacheError>;
    }
}
