//! Compiles a [`Query`] into a parameterized SQL predicate against the `events` table.
//!
//! No caller-supplied string ever flows into the SQL text: event types and tag subsets
//! are always passed as bound parameters, so the compiled SQL shape is deterministic for
//! a given query shape regardless of the values it carries.
use dcb_core::{Query, QueryItem, QueryOptions};
use sqlx::{Postgres, QueryBuilder};

/// Builds the full `SELECT` statement for `query`, honoring `options`' cursor, limit, and
/// ordering.
pub(crate) fn compile_select(query: &Query, options: &QueryOptions) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT type, tags, data, position, created_at FROM events WHERE (",
    );
    push_predicate(&mut builder, query);
    builder.push(")");

    if let Some(after) = options.from_position {
        builder.push(" AND position > ");
        builder.push_bind(after);
    }

    builder.push(" ORDER BY position ASC");

    if let Some(limit) = options.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
    }

    builder
}

/// Pushes the item-level-OR predicate for `query`: `TRUE` for a full scan, otherwise the
/// disjunction of each item's predicate.
fn push_predicate(builder: &mut QueryBuilder<'static, Postgres>, query: &Query) {
    if query.items().is_empty() {
        builder.push("TRUE");
        return;
    }

    let mut items = query.items().iter().peekable();
    while let Some(item) = items.next() {
        builder.push("(");
        push_item_predicate(builder, item);
        builder.push(")");
        if items.peek().is_some() {
            builder.push(" OR ");
        }
    }
}

/// Pushes one item's predicate: `type = ANY($types) AND tags @> $subset`, omitting either
/// clause when the item leaves it unconstrained.
fn push_item_predicate(builder: &mut QueryBuilder<'static, Postgres>, item: &QueryItem) {
    let has_types = !item.event_types().is_empty();
    let has_tags = !item.tags().is_empty();

    if !has_types && !has_tags {
        builder.push("TRUE");
        return;
    }

    if has_types {
        builder.push("type = ANY(");
        builder.push_bind(item.event_types().to_vec());
        builder.push(")");
    }

    if has_types && has_tags {
        builder.push(" AND ");
    }

    if has_tags {
        builder.push("tags @> ");
        builder.push_bind(item.tags().to_wire());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcb_core::{tags, Query, QueryItem, QueryOptions, TagSet};
    use sqlx::Execute;

    #[test]
    fn full_scan_compiles_to_true() {
        let mut builder = compile_select(&Query::match_all(), &QueryOptions::new());
        assert_eq!(
            builder.build().sql(),
            "SELECT type, tags, data, position, created_at FROM events WHERE (TRUE) ORDER BY position ASC"
        );
    }

    #[test]
    fn single_item_with_type_and_tags() {
        let query = Query::single(QueryItem::new(["CourseDefined"], tags! {"course_id" => "C1"}));
        let mut builder = compile_select(&query, &QueryOptions::new());
        assert_eq!(
            builder.build().sql(),
            "SELECT type, tags, data, position, created_at FROM events WHERE (type = ANY($1) AND tags @> $2) ORDER BY position ASC"
        );
    }

    #[test]
    fn type_only_item_omits_the_tags_clause() {
        let query = Query::single(QueryItem::of_types(["CourseDefined"]));
        let mut builder = compile_select(&query, &QueryOptions::new());
        assert_eq!(
            builder.build().sql(),
            "SELECT type, tags, data, position, created_at FROM events WHERE (type = ANY($1)) ORDER BY position ASC"
        );
    }

    #[test]
    fn tags_only_item_omits_the_type_clause() {
        let query = Query::single(QueryItem::with_tags(tags! {"course_id" => "C1"}));
        let mut builder = compile_select(&query, &QueryOptions::new());
        assert_eq!(
            builder.build().sql(),
            "SELECT type, tags, data, position, created_at FROM events WHERE (tags @> $1) ORDER BY position ASC"
        );
    }

    #[test]
    fn multiple_items_are_ored() {
        let query = Query::new([
            QueryItem::of_types(["A"]),
            QueryItem::with_tags(TagSet::empty()),
        ]);
        let mut builder = compile_select(&query, &QueryOptions::new());
        assert_eq!(
            builder.build().sql(),
            "SELECT type, tags, data, position, created_at FROM events WHERE (type = ANY($1)) OR (TRUE) ORDER BY position ASC"
        );
    }

    #[test]
    fn options_add_cursor_and_limit() {
        let options = QueryOptions::new().from_position(5).limit(10);
        let mut builder = compile_select(&Query::match_all(), &options);
        assert_eq!(
            builder.build().sql(),
            "SELECT type, tags, data, position, created_at FROM events WHERE (TRUE) AND position > $1 ORDER BY position ASC LIMIT $2"
        );
    }
}
