//! Shared utilities.

pub mod filename;
