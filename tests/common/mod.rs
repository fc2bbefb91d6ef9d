//! Common test utilities for render-batch integration tests

#[allow(dead_code)]
pub mod operations;

#[allow(unused_imports)]
pub use operations::*;
