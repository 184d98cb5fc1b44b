//! Configuration types and file handling.

pub mod persistence;
pub mod types;
