//! Projectors fold a slice of the event log into an opaque decision-model state.
//!
//! A [`Projector`] is the typed capability callers implement: `(id, query, initial_state,
//! transition)`. Because a single projection runs several projectors with unrelated
//! `State` types side by side, the engine stores them as a homogeneous collection of
//! [`ErasedProjector`] trait objects, type-erasing each projector's state through
//! `Box<dyn Any + Send>` and recovering it by downcasting on `id`.
use std::any::Any;
use std::collections::HashMap;

use crate::condition::AppendCondition;
use crate::event::{Position, StoredEvent};
use crate::query::Query;

/// A fold over the subset of the event stream selected by `query`.
///
/// `transition` must be a pure function of `(state, event)`; it must not panic. A panic
/// aborts the whole projection with [`crate::Error::Internal`] and the states of every
/// projector in the batch are left undefined.
pub trait Projector: Send + Sync {
    /// The opaque state this projector accumulates.
    type State: Send + 'static;

    /// Identifies this projector within a projection call. Must be unique among the
    /// projectors passed to a single `project`/`project_stream` call.
    fn id(&self) -> &str;

    /// The events this projector is interested in.
    fn query(&self) -> &Query;

    /// The state before any event has been folded in.
    fn initial_state(&self) -> Self::State;

    /// Folds one matching event into the current state.
    fn transition(&self, state: Self::State, event: &StoredEvent) -> Self::State;
}

/// The object-safe bridge that lets the engine hold projectors of unrelated `State`
/// types in one `Vec<Box<dyn ErasedProjector>>`.
pub trait ErasedProjector: Send + Sync {
    /// See [`Projector::id`].
    fn id(&self) -> &str;
    /// See [`Projector::query`].
    fn query(&self) -> &Query;
    /// See [`Projector::initial_state`], boxed.
    fn initial_state(&self) -> Box<dyn Any + Send>;
    /// See [`Projector::transition`], boxed. Panics if `state` was not produced by this
    /// same projector (an engine bug, not a caller-reachable condition).
    fn transition(&self, state: Box<dyn Any + Send>, event: &StoredEvent) -> Box<dyn Any + Send>;
}

/// Wraps a typed [`Projector`] so it can be stored as an [`ErasedProjector`].
pub struct ErasedProjectorAdapter<P>(pub P);

impl<P> ErasedProjector for ErasedProjectorAdapter<P>
where
    P: Projector,
{
    fn id(&self) -> &str {
        self.0.id()
    }

    fn query(&self) -> &Query {
        self.0.query()
    }

    fn initial_state(&self) -> Box<dyn Any + Send> {
        Box::new(self.0.initial_state())
    }

    fn transition(&self, state: Box<dyn Any + Send>, event: &StoredEvent) -> Box<dyn Any + Send> {
        let state = *state
            .downcast::<P::State>()
            .expect("projector state type mismatch: engine passed the wrong box back");
        Box::new(self.0.transition(state, event))
    }
}

/// Boxes a typed projector as an [`ErasedProjector`], for use with
/// [`crate::EventStore::project`] and [`crate::EventStore::project_stream`].
pub fn erase<P: Projector + 'static>(projector: P) -> Box<dyn ErasedProjector> {
    Box::new(ErasedProjectorAdapter(projector))
}

/// The result of a materialized projection: each projector's final state plus the
/// append condition that expresses the decision's consistency boundary.
pub struct Decision {
    states: HashMap<String, Box<dyn Any + Send>>,
    condition: AppendCondition,
}

impl Decision {
    pub(crate) fn new(states: HashMap<String, Box<dyn Any + Send>>, condition: AppendCondition) -> Self {
        Self { states, condition }
    }

    /// Borrows the final state of the projector identified by `id`, downcast to `S`.
    ///
    /// Returns `None` if no projector with this `id` ran, or if `S` does not match the
    /// type that projector actually produced.
    pub fn state<S: 'static>(&self, id: &str) -> Option<&S> {
        self.states.get(id).and_then(|boxed| boxed.downcast_ref::<S>())
    }

    /// Takes ownership of the final state of the projector identified by `id`.
    pub fn into_state<S: 'static>(&mut self, id: &str) -> Option<S> {
        self.states
            .remove(id)
            .and_then(|boxed| boxed.downcast::<S>().ok())
            .map(|boxed| *boxed)
    }

    /// The derived append condition: "fail any append that introduces a new event
    /// matching what this decision looked at, beyond the position it last observed."
    pub fn condition(&self) -> &AppendCondition {
        &self.condition
    }

    /// Consumes the decision, returning only the append condition.
    pub fn into_condition(self) -> AppendCondition {
        self.condition
    }
}

/// The accumulated, still-mutable state behind an in-progress streaming projection.
/// Lives behind a mutex shared with the projecting stream's generator; see
/// [`crate::event_store::ProjectingStream`].
pub(crate) struct ProjectionState {
    pub(crate) states: HashMap<String, Box<dyn Any + Send>>,
    pub(crate) last_position: Option<Position>,
}

impl ProjectionState {
    pub(crate) fn new(projectors: &[Box<dyn ErasedProjector>]) -> Self {
        Self {
            states: projectors
                .iter()
                .map(|p| (p.id().to_string(), p.initial_state()))
                .collect(),
            last_position: None,
        }
    }

    pub(crate) fn into_decision(self, combined_query: Query) -> Decision {
        let condition = AppendCondition::fail_if_events_match(combined_query, self.last_position);
        Decision::new(self.states, condition)
    }
}
