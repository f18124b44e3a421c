//! Timeline domain model shared by migration and provenance.
//!
//! # Responsibility
//! - Define the axis -> era -> segment -> marker hierarchy.
//! - Define the append-only provenance record and the write coordinate.
//!
//! # Invariants
//! - Hierarchy nodes are identified by stable UUIDs.
//! - A marker has exactly one owning segment.

pub mod state_change;
pub mod timeline;
pub mod write_context;
