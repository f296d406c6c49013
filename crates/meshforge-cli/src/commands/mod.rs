//! CLI command implementations

pub mod job;
pub mod serve;
pub mod tools;
