#![doc = include_str!("../README.md")]

mod config;
mod event_store;
mod query_compiler;

pub use crate::config::{Config, Isolation};
pub use crate::event_store::PgEventStore;

/// Re-exported so callers need only depend on this crate to build queries, tags, and
/// events against a [`PgEventStore`].
pub use dcb_core::{
    erase, tags, AppendCondition, Decision, ErasedProjector, Error, ErrorKind, EventStore,
    InputEvent, Position, Projector, Query, QueryItem, QueryOptions, StoredEvent, Tag, TagSet,
};
