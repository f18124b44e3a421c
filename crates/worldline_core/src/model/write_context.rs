//! Timeline coordinate attached to an entity write.
//!
//! # Responsibility
//! - Carry the axis/era/segment/marker/tick coordinate as an explicit value.
//! - Parse the coordinate from request header pairs.
//!
//! # Invariants
//! - `axis_id` is non-empty and `tick` is an integer; otherwise no context.
//! - Optional ids are `None` rather than empty strings.

use serde::{Deserialize, Serialize};

pub const HEADER_AXIS_ID: &str = "x-timeline-axis-id";
pub const HEADER_TICK: &str = "x-timeline-tick";
pub const HEADER_ERA_ID: &str = "x-timeline-era-id";
pub const HEADER_SEGMENT_ID: &str = "x-timeline-segment-id";
pub const HEADER_MARKER_ID: &str = "x-timeline-marker-id";
pub const HEADER_EVENT_ID: &str = "x-timeline-event-id";

/// Kind of primary write the provenance hook is observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Create,
    Update,
}

impl WriteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

/// Where on the timeline a write takes effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineWriteContext {
    pub axis_id: String,
    pub tick: i64,
    pub era_id: Option<String>,
    pub segment_id: Option<String>,
    pub marker_id: Option<String>,
    pub event_id: Option<String>,
}

impl TimelineWriteContext {
    /// Creates a context with only the required coordinate set.
    pub fn new(axis_id: impl Into<String>, tick: i64) -> Self {
        Self {
            axis_id: axis_id.into(),
            tick,
            era_id: None,
            segment_id: None,
            marker_id: None,
            event_id: None,
        }
    }

    /// Builds a context from `(name, value)` header pairs.
    ///
    /// Header names match case-insensitively and values are trimmed. Returns
    /// `None` when the axis id is missing/blank or the tick is missing or not
    /// an integer. Later duplicates of a header win.
    pub fn from_headers<'a, I>(headers: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut axis_id = None;
        let mut tick = None;
        let mut era_id = None;
        let mut segment_id = None;
        let mut marker_id = None;
        let mut event_id = None;

        for (name, value) in headers {
            let slot = match name.trim().to_ascii_lowercase().as_str() {
                HEADER_AXIS_ID => &mut axis_id,
                HEADER_TICK => &mut tick,
                HEADER_ERA_ID => &mut era_id,
                HEADER_SEGMENT_ID => &mut segment_id,
                HEADER_MARKER_ID => &mut marker_id,
                HEADER_EVENT_ID => &mut event_id,
                _ => continue,
            };
            *slot = non_blank(value);
        }

        let tick = tick?.parse::<i64>().ok()?;
        Some(Self {
            axis_id: axis_id?,
            tick,
            era_id,
            segment_id,
            marker_id,
            event_id,
        })
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
