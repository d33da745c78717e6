#![doc = include_str!("../README.md")]

mod condition;
mod error;
mod event;
mod event_store;
mod projector;
mod query;
mod tag;

#[doc(inline)]
pub use crate::condition::AppendCondition;
#[doc(inline)]
pub use crate::error::{Error, ErrorKind};
#[doc(inline)]
pub use crate::event::{InputEvent, Position, StoredEvent};
#[doc(inline)]
pub use crate::event_store::{EventStore, EventStream, ProjectingStream, QueryOptions};
#[doc(inline)]
pub use crate::projector::{erase, Decision, ErasedProjector, ErasedProjectorAdapter, Projector};
#[doc(inline)]
pub use crate::query::{Query, QueryItem};
#[doc(inline)]
pub use crate::tag::{Tag, TagSet};

/// The catch-all error type backends box their underlying failures into before wrapping
/// them in [`Error::Resource`].
pub type BoxDynError = Box<dyn std::error::Error + 'static + Send + Sync>;
