//! Timeline use-case services.
//!
//! # Responsibility
//! - Run the legacy timeline data migration as one atomic use case.
//! - Project committed entity writes into the provenance log.
//! - Keep callers decoupled from SQL and row decoding.

pub mod dual_write;
pub mod field_paths;
pub mod legacy_migration;
