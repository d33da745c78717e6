//! Backend configuration.
use std::time::Duration;

/// The transaction isolation level a `PgEventStore::append` call opens its transaction
/// under.
///
/// `ReadCommitted` is the default for unconditional appends; `RepeatableRead` is always
/// used for conditional appends unless the caller overrides it via
/// [`PgEventStore::append_with_isolation`](crate::PgEventStore::append_with_isolation).
/// `Serializable` trades throughput for strict serializability when composing several
/// conditional appends against concurrent writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// The default for unconditional appends: highest throughput, no snapshot
    /// stability guarantee.
    #[default]
    ReadCommitted,
    /// The default for conditional appends: a stable snapshot for the duration of the
    /// condition check and insert.
    RepeatableRead,
    /// Strict serializability, at the cost of possible serialization failures under
    /// contention (surfaced as [`dcb_core::Error::Concurrency`]).
    Serializable,
}

impl Isolation {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Isolation::ReadCommitted => "READ COMMITTED",
            Isolation::RepeatableRead => "REPEATABLE READ",
            Isolation::Serializable => "SERIALIZABLE",
        }
    }
}

/// Configuration for a [`PgEventStore`](crate::PgEventStore), with sane defaults out of
/// the box.
///
/// Built fluently: `Config::new().max_batch_size(500).query_timeout(Duration::from_secs(5))`.
#[derive(Debug, Clone)]
pub struct Config {
    max_batch_size: usize,
    query_timeout: Option<Duration>,
    append_timeout: Option<Duration>,
    default_append_isolation: Isolation,
    stream_buffer: usize,
    lock_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            query_timeout: None,
            append_timeout: None,
            default_append_isolation: Isolation::ReadCommitted,
            stream_buffer: 128,
            lock_timeout: None,
        }
    }
}

impl Config {
    /// The default configuration: `max_batch_size` 1000, no timeouts, Read Committed
    /// default isolation, a stream buffer of 128, no lock timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of events a single `append` call may carry; larger batches are
    /// rejected as [`dcb_core::Error::Validation`] before any I/O.
    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Bounds how long a single `query`/`query_stream` call may run before it is
    /// abandoned with [`dcb_core::Error::Resource`].
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Bounds how long a single `append` call may run before it is abandoned with
    /// [`dcb_core::Error::Resource`]. The transaction is rolled back; no partial append
    /// survives.
    pub fn append_timeout(mut self, timeout: Duration) -> Self {
        self.append_timeout = Some(timeout);
        self
    }

    /// The isolation level used for unconditional appends. Conditional appends always
    /// use `RepeatableRead` regardless of this setting, unless overridden per-call.
    pub fn default_append_isolation(mut self, isolation: Isolation) -> Self {
        self.default_append_isolation = isolation;
        self
    }

    /// Advisory buffer size for `query_stream`'s underlying cursor.
    pub fn stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer;
        self
    }

    /// Forwarded to the session as `SET LOCAL lock_timeout` at the start of each append
    /// transaction.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub(crate) fn max_batch_size_limit(&self) -> usize {
        self.max_batch_size
    }

    pub(crate) fn query_timeout_duration(&self) -> Option<Duration> {
        self.query_timeout
    }

    pub(crate) fn append_timeout_duration(&self) -> Option<Duration> {
        self.append_timeout
    }

    pub(crate) fn default_isolation(&self) -> Isolation {
        self.default_append_isolation
    }

    pub(crate) fn stream_buffer_size(&self) -> usize {
        self.stream_buffer
    }

    pub(crate) fn lock_timeout_duration(&self) -> Option<Duration> {
        self.lock_timeout
    }
}
