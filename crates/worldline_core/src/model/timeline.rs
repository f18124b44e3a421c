//! Hierarchical timeline read models.
//!
//! # Invariants
//! - `TimelineSegment::legacy_timeline_id` is unique when set.
//! - `TimelineMarker::legacy_event_id` is unique when set.
//! - `start_tick <= end_tick` for segments produced by migration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for axis/era/segment/marker nodes.
pub type TimelineNodeId = Uuid;

/// Root of one timeline hierarchy (for example one narrative continuity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineAxis {
    pub id: TimelineNodeId,
    /// Unique natural key.
    pub code: String,
    pub name: String,
    pub axis_type: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Ordered subdivision of an axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEra {
    pub id: TimelineNodeId,
    pub axis_id: TimelineNodeId,
    /// Unique natural key.
    pub code: String,
    pub name: String,
    pub summary: Option<String>,
    pub order: i64,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Bounded tick range within an era. Replaces one legacy timeline node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSegment {
    pub id: TimelineNodeId,
    pub axis_id: TimelineNodeId,
    pub era_id: TimelineNodeId,
    pub name: String,
    pub code: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub order: i64,
    pub start_tick: i64,
    pub end_tick: i64,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    /// Provenance key of the legacy timeline this segment came from.
    pub legacy_timeline_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Point-in-tick event reference owned by exactly one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMarker {
    pub id: TimelineNodeId,
    pub axis_id: TimelineNodeId,
    pub era_id: TimelineNodeId,
    pub segment_id: TimelineNodeId,
    pub label: String,
    pub tick: i64,
    pub marker_type: String,
    pub description: Option<String>,
    /// Event the marker points at.
    pub event_ref_id: Option<String>,
    /// Provenance key of the legacy occurs-on edge's event.
    pub legacy_event_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}
