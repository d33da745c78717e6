//! A query selects a slice of the event log by event type and tags.
//!
//! A [`Query`] is a finite sequence of [`QueryItem`]s combined with item-level OR: a
//! stored event matches the query iff it matches at least one item. An item matches iff
//! its event types are empty or contain the event's type, and its tags are a subset of
//! the event's tags.
use crate::event::StoredEvent;
use crate::tag::TagSet;

/// A single predicate within a [`Query`]: `(eventTypes, tags)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryItem {
    event_types: Vec<String>,
    tags: TagSet,
}

impl QueryItem {
    /// Builds a query item. Both `event_types` and `tags` may be empty; an item with
    /// both empty matches every event.
    pub fn new(event_types: impl IntoIterator<Item = impl Into<String>>, tags: TagSet) -> Self {
        Self {
            event_types: event_types.into_iter().map(Into::into).collect(),
            tags,
        }
    }

    /// An item matching any event of the given types, regardless of tags.
    pub fn of_types(event_types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(event_types, TagSet::empty())
    }

    /// An item matching any event carrying the given tags, regardless of type.
    pub fn with_tags(tags: TagSet) -> Self {
        Self::new(Vec::<String>::new(), tags)
    }

    /// An item matching every event.
    pub fn any() -> Self {
        Self::default()
    }

    /// The event types this item restricts to, empty meaning "any type".
    pub fn event_types(&self) -> &[String] {
        &self.event_types
    }

    /// The tags this item requires as a subset of the event's tags.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Evaluates this item against a stored event.
    pub fn matches(&self, event: &StoredEvent) -> bool {
        let type_matches =
            self.event_types.is_empty() || self.event_types.iter().any(|t| t == event.event_type());
        type_matches && self.tags.is_subset_of(event.tags())
    }
}

/// A finite sequence of [`QueryItem`]s, matched with item-level OR semantics.
///
/// The empty query (no items) matches every event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    items: Vec<QueryItem>,
}

impl Query {
    /// Builds a query from a sequence of items.
    pub fn new(items: impl IntoIterator<Item = QueryItem>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// The empty query: matches every event.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// A query with a single item.
    pub fn single(item: QueryItem) -> Self {
        Self { items: vec![item] }
    }

    /// The items making up this query.
    pub fn items(&self) -> &[QueryItem] {
        &self.items
    }

    /// Returns `true` if this query has no items (a full scan).
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Evaluates the query against a stored event: matches iff any item matches.
    pub fn matches(&self, event: &StoredEvent) -> bool {
        self.items.is_empty() || self.items.iter().any(|item| item.matches(event))
    }

    /// Concatenates the items of several queries, preserving duplicates.
    ///
    /// Used by the projection engine to compute the combined query of several
    /// projectors; callers may de-duplicate upstream if desired.
    pub fn union(queries: impl IntoIterator<Item = Query>) -> Self {
        let items = queries.into_iter().flat_map(|q| q.items).collect();
        Self { items }
    }
}

impl FromIterator<QueryItem> for Query {
    fn from_iter<T: IntoIterator<Item = QueryItem>>(iter: T) -> Self {
        Self::new(iter)
    }
}
