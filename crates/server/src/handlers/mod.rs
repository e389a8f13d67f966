//! HTTP request handlers.

pub mod admin;
pub mod documents;
pub mod health;

pub use admin::*;
pub use documents::*;
pub use health::*;
