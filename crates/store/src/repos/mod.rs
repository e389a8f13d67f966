//! Repository traits for document operations.

pub mod documents;
pub mod stats;

pub use documents::{BatchScope, DocumentRepo};
pub use stats::StatsRepo;
