//! Common test utilities and fixtures.

pub mod engines;

#[allow(unused_imports)]
pub use engines::*;
