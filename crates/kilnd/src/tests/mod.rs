//! Test suites for the Kiln daemon.

pub(crate) mod support;
