//! PostgreSQL-backed [`EventStore`].
//!
//! Everything here is plumbing around two stored procedures (`migrations/0001`):
//! `append_events_batch` for an unconditional insert, and
//! `append_events_with_condition` for an insert guarded by a [`AppendCondition`]
//! evaluated in the same transaction. The SQL predicate for reads and for the
//! condition's consistency boundary is produced by the query compiler.
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::postgres::PgPool;
use sqlx::Row;

use dcb_core::{
    AppendCondition, Error, EventStore, EventStream, InputEvent, Position, Query, QueryOptions,
    StoredEvent, TagSet,
};

use crate::config::{Config, Isolation};
use crate::query_compiler::compile_select;

/// A [`dcb_core::EventStore`] backed by a single PostgreSQL `events` table.
///
/// Cheaply cloneable: it holds a [`PgPool`] (itself an `Arc`-backed handle) and an
/// immutable [`Config`]. Construction does not create, drop, or migrate the schema — the
/// operator applies `migrations/0001_events.sql` ahead of time.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    config: Config,
}

impl PgEventStore {
    /// Wraps `pool` with the default [`Config`].
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, Config::default())
    }

    /// Wraps `pool` with an explicit [`Config`].
    pub fn with_config(pool: PgPool, config: Config) -> Self {
        Self { pool, config }
    }

    /// Borrows the underlying connection pool, e.g. for backend-specific maintenance
    /// queries outside this crate's contract.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Like [`EventStore::append`], but lets the caller pick the transaction isolation
    /// level explicitly rather than accept the default this store's [`Config`] and
    /// `condition` would otherwise select.
    pub async fn append_with_isolation(
        &self,
        events: Vec<InputEvent>,
        condition: AppendCondition,
        isolation: Isolation,
    ) -> Result<Position, Error> {
        if events.is_empty() {
            return Err(Error::validation("append", "append requires at least one event"));
        }
        let max_batch_size = self.config.max_batch_size_limit();
        if events.len() > max_batch_size {
            return Err(Error::validation(
                "append",
                format!(
                    "batch of {} events exceeds max_batch_size {max_batch_size}",
                    events.len()
                ),
            ));
        }

        let types: Vec<String> = events.iter().map(|e| e.event_type().to_string()).collect();
        let tags: Vec<serde_json::Value> = events
            .iter()
            .map(|e| serde_json::Value::from(e.tags().to_wire()))
            .collect();
        let data: Vec<serde_json::Value> = events.iter().map(InputEvent::data_as_json).collect();

        let run = self.run_append(types, tags, data, &condition, isolation);

        match self.config.append_timeout_duration() {
            Some(timeout) => tokio::time::timeout(timeout, run)
                .await
                .map_err(|err| Error::resource("append", err))?,
            None => run.await,
        }
    }

    async fn run_append(
        &self,
        types: Vec<String>,
        tags: Vec<serde_json::Value>,
        data: Vec<serde_json::Value>,
        condition: &AppendCondition,
        isolation: Isolation,
    ) -> Result<Position, Error> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| Error::resource("append", err))?;

        sqlx::query(&format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            isolation.as_sql()
        ))
        .execute(&mut *tx)
        .await
        .map_err(|err| Error::resource("append", err))?;

        if let Some(lock_timeout) = self.config.lock_timeout_duration() {
            sqlx::query(&format!(
                "SET LOCAL lock_timeout = '{}ms'",
                lock_timeout.as_millis()
            ))
            .execute(&mut *tx)
            .await
            .map_err(|err| Error::resource("append", err))?;
        }

        let position: i64 = match condition_payload(condition) {
            None => sqlx::query_scalar(
                "SELECT append_events_batch($1::text[], $2::jsonb[], $3::jsonb[])",
            )
            .bind(&types)
            .bind(&tags)
            .bind(&data)
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| classify_db_error("append", err, condition))?,
            Some(payload) => sqlx::query_scalar(
                "SELECT append_events_with_condition($1::text[], $2::jsonb[], $3::jsonb[], $4::jsonb)",
            )
            .bind(&types)
            .bind(&tags)
            .bind(&data)
            .bind(payload)
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| classify_db_error("append", err, condition))?,
        };

        tx.commit()
            .await
            .map_err(|err| classify_db_error("append", err, condition))?;

        Ok(position)
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn query(&self, query: &Query, options: &QueryOptions) -> Result<Vec<StoredEvent>, Error> {
        let mut builder = compile_select(query, options);
        let fetch = builder.build().fetch_all(&self.pool);

        let rows = match self.config.query_timeout_duration() {
            Some(timeout) => tokio::time::timeout(timeout, fetch)
                .await
                .map_err(|err| Error::resource("query", err))?
                .map_err(|err| Error::resource("query", err))?,
            None => fetch.await.map_err(|err| Error::resource("query", err))?,
        };

        rows.into_iter().map(|row| row_to_stored_event("query", row)).collect()
    }

    fn query_stream<'a>(&'a self, query: &'a Query, options: &'a QueryOptions) -> EventStream<'a> {
        let mut builder = compile_select(query, options);
        let pool = self.pool.clone();
        let timeout = self.config.query_timeout_duration();

        try_stream! {
            let mut rows = builder.build().fetch(&pool);
            loop {
                let next: Option<Result<sqlx::postgres::PgRow, sqlx::Error>> = match timeout {
                    Some(timeout) => tokio::time::timeout(timeout, rows.next())
                        .await
                        .map_err(|err| Error::resource("query_stream", err))?,
                    None => rows.next().await,
                };
                let Some(row) = next else { break };
                let row = row.map_err(|err| Error::resource("query_stream", err))?;
                yield row_to_stored_event("query_stream", row)?;
            }
        }
        .boxed()
    }

    async fn append(&self, events: Vec<InputEvent>, condition: AppendCondition) -> Result<Position, Error> {
        let isolation = match condition {
            AppendCondition::Unconditional => self.config.default_isolation(),
            AppendCondition::FailIfEventsMatch { .. } => Isolation::RepeatableRead,
        };
        self.append_with_isolation(events, condition, isolation).await
    }
}

/// Encodes an [`AppendCondition`] as the `condition JSONB` parameter the stored
/// procedure expects. `Unconditional` has no SQL-level representation: the caller uses
/// `append_events_batch` directly, so this returns `None`.
fn condition_payload(condition: &AppendCondition) -> Option<serde_json::Value> {
    match condition {
        AppendCondition::Unconditional => None,
        AppendCondition::FailIfEventsMatch { query, after } => {
            let items: Vec<serde_json::Value> = query
                .items()
                .iter()
                .map(|item| {
                    let tags: Vec<serde_json::Value> = item
                        .tags()
                        .iter()
                        .map(|tag| serde_json::json!({"key": tag.key(), "value": tag.value()}))
                        .collect();
                    serde_json::json!({
                        "event_types": item.event_types(),
                        "tags": tags,
                    })
                })
                .collect();
            Some(serde_json::json!({
                "fail_if_events_match": { "items": items },
                "after": after,
            }))
        }
    }
}

/// Classifies a failed append's `sqlx::Error` into the crate's error taxonomy: a
/// serialization failure (SQLSTATE `40001`) or a raised `append condition violated`
/// exception both become [`Error::Concurrency`] carrying the condition that was being evaluated;
/// anything else is [`Error::Resource`].
fn classify_db_error(operation: &'static str, err: sqlx::Error, condition: &AppendCondition) -> Error {
    if let sqlx::Error::Database(ref db_err) = err {
        let is_serialization_failure = db_err.code().as_deref() == Some("40001");
        let is_condition_violation = db_err.message().starts_with("append condition violated");
        if is_serialization_failure || is_condition_violation {
            return Error::concurrency(operation, condition.clone());
        }
    }
    Error::resource(operation, err)
}

/// Reconstructs a [`StoredEvent`] from one row of the `events` table.
///
/// A parse failure here means the row was not written by this crate's append path (or
/// the schema has drifted) — an engine-level invariant violation, not a caller mistake,
/// so it is reported as [`Error::Internal`] rather than [`Error::Validation`].
fn row_to_stored_event(operation: &'static str, row: sqlx::postgres::PgRow) -> Result<StoredEvent, Error> {
    let event_type: String = row
        .try_get("type")
        .map_err(|err| Error::internal(operation, format!("malformed events row: {err}")))?;
    let wire_tags: Vec<String> = row
        .try_get("tags")
        .map_err(|err| Error::internal(operation, format!("malformed events row: {err}")))?;
    let data: serde_json::Value = row
        .try_get("data")
        .map_err(|err| Error::internal(operation, format!("malformed events row: {err}")))?;
    let position: Position = row
        .try_get("position")
        .map_err(|err| Error::internal(operation, format!("malformed events row: {err}")))?;
    let created_at: chrono::DateTime<chrono::Utc> = row
        .try_get("created_at")
        .map_err(|err| Error::internal(operation, format!("malformed events row: {err}")))?;

    let tags = TagSet::from_wire(wire_tags)
        .map_err(|err| Error::internal(operation, format!("stored tag set failed to parse: {err}")))?;
    let input = InputEvent::with_json(event_type, tags, &data)
        .map_err(|err| Error::internal(operation, format!("stored event failed re-validation: {err}")))?;

    Ok(StoredEvent::new(input, position, created_at))
}
