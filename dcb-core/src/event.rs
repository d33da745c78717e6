//! Input and stored event value types.
use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::tag::TagSet;

/// The monotonic 64-bit ordinal assigned by the database at commit time.
///
/// Positions form the total order of the event log. The core never assigns positions
/// itself; they are returned by the storage backend.
pub type Position = i64;

/// An event submitted by a caller, not yet persisted.
///
/// Construction validates `event_type` (non-empty), `tags` (non-empty, well-formed),
/// and `data` (must parse as JSON). Validation happens once, at construction, so that
/// later stages may assume well-formed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    event_type: String,
    tags: TagSet,
    data: Vec<u8>,
}

impl InputEvent {
    /// Builds a new input event, validating its fields.
    pub fn new(
        event_type: impl Into<String>,
        tags: TagSet,
        data: impl Into<Vec<u8>>,
    ) -> Result<Self, Error> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(Error::validation("InputEvent::new", "event type must not be empty"));
        }
        if tags.is_empty() {
            return Err(Error::validation(
                "InputEvent::new",
                "an input event must carry at least one tag",
            ));
        }
        let data = data.into();
        if let Err(err) = serde_json::from_slice::<serde_json::Value>(&data) {
            return Err(Error::validation(
                "InputEvent::new",
                format!("event data must parse as JSON: {err}"),
            ));
        }
        Ok(Self {
            event_type,
            tags,
            data,
        })
    }

    /// Builds a new input event from an already-parsed [`serde_json::Value`], which
    /// cannot fail JSON validation by construction.
    pub fn with_json(
        event_type: impl Into<String>,
        tags: TagSet,
        data: &serde_json::Value,
    ) -> Result<Self, Error> {
        Self::new(
            event_type,
            tags,
            serde_json::to_vec(data).expect("a serde_json::Value always serializes"),
        )
    }

    /// The event's type name.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The tags carried by this event.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// The raw JSON payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Parses the payload as a [`serde_json::Value`].
    ///
    /// Infallible: validity was already checked at construction.
    pub fn data_as_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.data).expect("data was validated as JSON at construction")
    }
}

/// An [`InputEvent`] that has been persisted, carrying its server-assigned position and
/// insertion timestamp.
///
/// Two stored events are never equal across different append calls, even if their
/// content matches: identity is `position` alone.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    event: InputEvent,
    position: Position,
    created_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Wraps an input event with its assigned position and timestamp.
    pub fn new(event: InputEvent, position: Position, created_at: DateTime<Utc>) -> Self {
        Self {
            event,
            position,
            created_at,
        }
    }

    /// The event's type name.
    pub fn event_type(&self) -> &str {
        self.event.event_type()
    }

    /// The tags carried by this event.
    pub fn tags(&self) -> &TagSet {
        self.event.tags()
    }

    /// The raw JSON payload.
    pub fn data(&self) -> &[u8] {
        self.event.data()
    }

    /// Parses the payload as a [`serde_json::Value`].
    pub fn data_as_json(&self) -> serde_json::Value {
        self.event.data_as_json()
    }

    /// The server-assigned position. The sole identity of a stored event.
    pub fn position(&self) -> Position {
        self.position
    }

    /// The insert-time timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Discards position and timestamp, returning the underlying input event.
    pub fn into_input_event(self) -> InputEvent {
        self.event
    }
}

impl PartialEq for StoredEvent {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
    }
}
impl Eq for StoredEvent {}
