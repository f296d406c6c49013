//! Meshforge Core - shared error type for the meshforge crates
//!
//! Every fallible operation in the workspace returns [`Result`], whose error
//! side is [`ForgeError`].

mod error;

pub use error::{ForgeError, Result};
