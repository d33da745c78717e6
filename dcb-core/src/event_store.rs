//! The event store: the async boundary between the storage-agnostic core and a backend.
//!
//! Everything in this module is storage-agnostic; `dcb-postgres` supplies the only
//! backend in this crate family, realizing `EventStore` over PostgreSQL with its own
//! schema and query compiler.
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

use crate::condition::AppendCondition;
use crate::error::Error;
use crate::event::{InputEvent, Position, StoredEvent};
use crate::projector::{Decision, ErasedProjector, ProjectionState};
use crate::query::Query;

/// Advisory options for a read.
///
/// All fields are optional; a default `QueryOptions` performs an unbounded scan of the
/// whole query from the start of the log.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Only events at a position strictly greater than this one are returned.
    pub from_position: Option<Position>,
    /// Caps the number of events returned (materialized reads) or produced (streams).
    pub limit: Option<u64>,
    /// Advisory cursor fetch size for the streaming read. Backends may ignore this.
    pub batch_size: Option<u32>,
}

impl QueryOptions {
    /// The default options: unbounded scan from the beginning of the log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only return events after this position.
    pub fn from_position(mut self, position: Position) -> Self {
        self.from_position = Some(position);
        self
    }

    /// Cap the number of events returned.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Advisory fetch size for the underlying cursor.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

/// A lazy, finite, non-restartable sequence of stored events ordered by `position ASC`.
/// Dropping the stream releases whatever cursor the backend opened to produce it.
pub type EventStream<'a> = BoxStream<'a, Result<StoredEvent, Error>>;

/// The event store: the single trait every storage backend in this crate family
/// implements.
///
/// `query` and `query_stream` are read-only and never take locks beyond what the
/// backend's own read path grants. `append` is the sole write path. `project` and
/// `project_stream` are provided in terms of `query_stream` and need not be
/// reimplemented by a backend.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Executes `query`, returning every matching event ordered by `position ASC`.
    ///
    /// Never partial: either every matching event (within `options`) is returned, or the
    /// whole call fails.
    async fn query(&self, query: &Query, options: &QueryOptions) -> Result<Vec<StoredEvent>, Error>;

    /// Executes `query`, returning a bounded-memory asynchronous stream of matching
    /// events ordered by `position ASC`.
    fn query_stream<'a>(&'a self, query: &'a Query, options: &'a QueryOptions) -> EventStream<'a>;

    /// Atomically appends `events`, optionally under `condition`, returning the position
    /// assigned to the last event on success.
    ///
    /// `events` must be non-empty and within the backend's configured batch size limit;
    /// violations are reported as [`Error::Validation`] before anything is sent to
    /// storage. A violated `condition` is reported as [`Error::Concurrency`] carrying the
    /// condition; no event from `events` is persisted in that case.
    async fn append(&self, events: Vec<InputEvent>, condition: AppendCondition) -> Result<Position, Error>;

    /// Runs every projector in `projectors` over the union of their queries and returns
    /// their final states plus the derived append condition.
    ///
    /// A transition that panics aborts the projection with [`Error::Internal`]; no
    /// `Decision` is returned in that case.
    async fn project(&self, projectors: Vec<Box<dyn ErasedProjector>>) -> Result<Decision, Error> {
        let mut stream = self.project_stream(projectors);
        while stream.next().await.transpose()?.is_some() {}
        Ok(stream.into_decision())
    }

    /// Like [`EventStore::project`], but exposes per-event progress as a stream instead
    /// of materializing the whole fold before returning.
    ///
    /// The append condition obtained from [`ProjectingStream::into_decision`] only
    /// reflects events the stream has actually yielded; callers that stop draining early
    /// get the consistency boundary "as of the last event I saw".
    fn project_stream<'a>(&'a self, projectors: Vec<Box<dyn ErasedProjector>>) -> ProjectingStream<'a> {
        let combined_query = Query::union(projectors.iter().map(|p| p.query().clone()));
        let shared = Arc::new(Mutex::new(ProjectionState::new(&projectors)));
        let shared_for_generator = Arc::clone(&shared);
        let mut source = self.query_stream(&combined_query, &QueryOptions::new());

        let inner = try_stream! {
            while let Some(event) = source.next().await {
                let event = event?;
                {
                    let mut state = shared_for_generator
                        .lock()
                        .expect("projection state mutex poisoned");
                    state.last_position = Some(event.position());
                    for projector in &projectors {
                        if !projector.query().matches(&event) {
                            continue;
                        }
                        let id = projector.id().to_string();
                        if let Some(projector_state) = state.states.remove(&id) {
                            let transitioned = std::panic::catch_unwind(AssertUnwindSafe(|| {
                                projector.transition(projector_state, &event)
                            }))
                            .map_err(|_| {
                                Error::internal(
                                    "project_stream",
                                    format!("projector '{id}' panicked during transition"),
                                )
                            })?;
                            state.states.insert(id, transitioned);
                        }
                    }
                }
                yield event;
            }
        };

        ProjectingStream {
            inner: inner.boxed(),
            shared,
            combined_query,
        }
    }
}

/// The stream returned by [`EventStore::project_stream`].
///
/// Yields each folded [`StoredEvent`] in position order. Call
/// [`ProjectingStream::into_decision`] after draining (fully, or having stopped early) to
/// recover the final projector states and the derived append condition.
pub struct ProjectingStream<'a> {
    inner: EventStream<'a>,
    shared: Arc<Mutex<ProjectionState>>,
    combined_query: Query,
}

impl<'a> Stream for ProjectingStream<'a> {
    type Item = Result<StoredEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<'a> ProjectingStream<'a> {
    /// Consumes the stream, turning the states it has accumulated so far into a
    /// [`Decision`]. Drops the underlying source stream first, releasing any cursor it
    /// held, so the shared projection state has exactly one remaining owner.
    pub fn into_decision(self) -> Decision {
        drop(self.inner);
        let state = Arc::try_unwrap(self.shared)
            .unwrap_or_else(|_| panic!("project_stream: source stream outlived into_decision"))
            .into_inner()
            .expect("projection state mutex poisoned");
        state.into_decision(self.combined_query)
    }
}
