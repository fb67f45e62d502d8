//! Shared types for the Instant On gateway crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
