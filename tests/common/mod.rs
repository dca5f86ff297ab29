//! Common test utilities for release-mirror integration tests

#[allow(dead_code)]
pub mod fixtures;
#[allow(dead_code)]
pub mod server;

#[allow(unused_imports)]
pub use fixtures::*;
pub use server::*;
