//! Tags are key/value pairs attached to events and used to select slices of the log.
//!
//! A [`Tag`] is a validated `(key, value)` pair. A [`TagSet`] is the set of tags carried
//! by a single event, or referenced by a single query item. Tags are serialized on the
//! wire as `"key:value"` strings, which is also the format the storage layer indexes.
use std::collections::BTreeSet;
use std::fmt;

use crate::error::Error;

/// The character reserved as the key/value separator in the wire format.
const SEPARATOR: char = ':';

/// A validated `(key, value)` pair.
///
/// Two tags are equal iff both components match. Neither component may be empty or
/// contain the `:` separator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Creates a new tag, validating the key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, Error> {
        let key = key.into();
        let value = value.into();
        validate_component("tag key", &key)?;
        validate_component("tag value", &value)?;
        Ok(Self { key, value })
    }

    /// The tag's key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The tag's value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Renders the tag in the `"key:value"` wire format.
    pub fn to_wire(&self) -> String {
        format!("{}{SEPARATOR}{}", self.key, self.value)
    }

    /// Parses a single `"key:value"` wire string back into a [`Tag`].
    ///
    /// Used by storage backends to reconstruct a [`TagSet`] from the `TEXT[]` column; a
    /// malformed string indicates storage was written by something other than this
    /// crate's append path.
    pub fn from_wire(s: &str) -> Result<Self, Error> {
        let (key, value) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| Error::validation("Tag::from_wire", format!("malformed tag wire format: {s:?}")))?;
        Tag::new(key, value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

impl TryFrom<(&str, &str)> for Tag {
    type Error = Error;

    fn try_from((key, value): (&str, &str)) -> Result<Self, Self::Error> {
        Tag::new(key, value)
    }
}

fn validate_component(what: &str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::validation("Tag::new", format!("{what} must not be empty")));
    }
    if value.contains(SEPARATOR) {
        return Err(Error::validation(
            "Tag::new",
            format!("{what} must not contain the '{SEPARATOR}' separator: {value:?}"),
        ));
    }
    Ok(())
}

/// A finite set of [`Tag`]s with no duplicate `(key, value)` pairs.
///
/// Ordering of tags carries no meaning; `TagSet` stores them in a `BTreeSet` purely for
/// deterministic iteration (stable SQL parameter ordering, reproducible test assertions).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagSet(BTreeSet<Tag>);

impl TagSet {
    /// An empty tag set. Valid inside a query item; not valid for an input event.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a tag set from an iterator of already-validated tags.
    pub fn new(tags: impl IntoIterator<Item = Tag>) -> Self {
        Self(tags.into_iter().collect())
    }

    /// Builds a tag set from `(key, value)` pairs, validating each one.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self, Error>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let tags = pairs
            .into_iter()
            .map(|(k, v)| Tag::new(k, v))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self(tags))
    }

    /// Returns `true` if this tag set has no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of tags in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the tags in a deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    /// Returns `true` if every tag in `self` is present in `other` (subset match).
    pub fn is_subset_of(&self, other: &TagSet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Renders every tag in the `"key:value"` wire format, in deterministic order.
    pub fn to_wire(&self) -> Vec<String> {
        self.0.iter().map(Tag::to_wire).collect()
    }

    /// Parses a sequence of `"key:value"` wire strings back into a [`TagSet`].
    pub fn from_wire(strings: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self, Error> {
        let tags = strings
            .into_iter()
            .map(|s| Tag::from_wire(s.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self(tags))
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::collections::btree_set::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<T: IntoIterator<Item = Tag>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Builds a [`TagSet`] from `key: value` pairs, panicking on invalid input.
///
/// Intended for tests and call sites where the tags are compile-time literals known to
/// be valid; production code that handles caller-supplied strings should use
/// [`TagSet::from_pairs`] instead and propagate the [`Error`].
#[macro_export]
macro_rules! tags {
    ($($key:expr => $value:expr),* $(,)?) => {{
        $crate::TagSet::from_pairs([$(($key, $value)),*]).expect("invalid tag literal")
    }};
}
