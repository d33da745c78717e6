//! End-to-end scenarios against a real PostgreSQL instance, plus a handful of property
//! tests for the core invariants. Each test gets its own scratch database with
//! `migrations/0001_events.sql` already applied, via `#[sqlx::test]`.
use dcb_core::{erase, tags, AppendCondition, Error, ErrorKind, EventStore, InputEvent, Projector, Query, QueryItem, QueryOptions, StoredEvent};
use dcb_postgres::PgEventStore;
use futures::StreamExt;
use sqlx::PgPool;

fn course_defined(course_id: &str, max_students: i64) -> InputEvent {
    InputEvent::new(
        "CourseDefined",
        tags! {"course_id" => course_id},
        serde_json::to_vec(&serde_json::json!({"maxStudents": max_students})).unwrap(),
    )
    .unwrap()
}

fn student_enrolled(course_id: &str, student_id: &str) -> InputEvent {
    InputEvent::new(
        "StudentEnrolled",
        tags! {"course_id" => course_id, "student_id" => student_id},
        b"{}".to_vec(),
    )
    .unwrap()
}

// Append and read back.
#[sqlx::test]
async fn append_and_read_back(pool: PgPool) {
    let store = PgEventStore::new(pool);

    store
        .append(vec![course_defined("C1", 30)], AppendCondition::Unconditional)
        .await
        .unwrap();

    let found = store
        .query(
            &Query::single(QueryItem::new(["CourseDefined"], tags! {"course_id" => "C1"})),
            &QueryOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].position(), 1);
    assert_eq!(found[0].data_as_json(), serde_json::json!({"maxStudents": 30}));
}

// Tag subset match.
#[sqlx::test]
async fn tag_subset_match(pool: PgPool) {
    let store = PgEventStore::new(pool);
    store
        .append(
            vec![student_enrolled("C1", "S1")],
            AppendCondition::Unconditional,
        )
        .await
        .unwrap();

    let by_type_and_tag = store
        .query(
            &Query::single(QueryItem::new(
                ["StudentEnrolled"],
                tags! {"course_id" => "C1"},
            )),
            &QueryOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(by_type_and_tag.len(), 1);

    let by_tag_only = store
        .query(
            &Query::single(QueryItem::with_tags(tags! {"student_id" => "S1"})),
            &QueryOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(by_tag_only.len(), 1);

    let wrong_course = store
        .query(
            &Query::single(QueryItem::with_tags(tags! {"course_id" => "C2"})),
            &QueryOptions::new(),
        )
        .await
        .unwrap();
    assert!(wrong_course.is_empty());
}

// Duplicate-detection via an append condition.
#[sqlx::test]
async fn duplicate_detection_via_condition(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let by_email = Query::single(QueryItem::new(["UserCreated"], tags! {"email" => "a@b"}));

    let user_created = |email: &str| {
        InputEvent::new("UserCreated", tags! {"email" => email}, b"{}".to_vec()).unwrap()
    };

    store
        .append(vec![user_created("a@b")], AppendCondition::Unconditional)
        .await
        .unwrap();

    let result = store
        .append(
            vec![user_created("a@b")],
            AppendCondition::fail_if_events_match(by_email.clone(), None),
        )
        .await;

    assert!(matches!(result, Err(Error::Concurrency { .. })));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Concurrency);

    let all = store.query(&by_email, &QueryOptions::new()).await.unwrap();
    assert_eq!(all.len(), 1);
}

// Decision model with condition.
#[sqlx::test]
async fn decision_model_condition(pool: PgPool) {
    let store = PgEventStore::new(pool);

    let account_opened = |account: &str, balance: i64| {
        InputEvent::new(
            "AccountOpened",
            tags! {"account_id" => account},
            serde_json::to_vec(&serde_json::json!({"balance": balance})).unwrap(),
        )
        .unwrap()
    };
    store
        .append(
            vec![account_opened("A", 1000), account_opened("B", 500)],
            AppendCondition::Unconditional,
        )
        .await
        .unwrap();

    struct Balance {
        account_id: String,
        query: Query,
    }
    impl Projector for Balance {
        type State = i64;
        fn id(&self) -> &str {
            &self.account_id
        }
        fn query(&self) -> &Query {
            &self.query
        }
        fn initial_state(&self) -> i64 {
            0
        }
        fn transition(&self, state: i64, event: &StoredEvent) -> i64 {
            match event.event_type() {
                "AccountOpened" => event.data_as_json()["balance"].as_i64().unwrap(),
                _ => state,
            }
        }
    }
    let projector_for = |account: &str| Balance {
        account_id: account.to_string(),
        query: Query::single(QueryItem::new(
            ["AccountOpened", "MoneyTransferred"],
            tags! {"account_id" => account},
        )),
    };

    let mut decision = store
        .project(vec![erase(projector_for("A")), erase(projector_for("B"))])
        .await
        .unwrap();
    assert_eq!(decision.into_state::<i64>("A"), Some(1000));
    assert_eq!(decision.into_state::<i64>("B"), Some(500));
    let condition = decision.into_condition();

    let transfer = InputEvent::new(
        "MoneyTransferred",
        tags! {"account_id" => "A", "to_account_id" => "B"},
        serde_json::to_vec(&serde_json::json!({"amount": 100})).unwrap(),
    )
    .unwrap();
    store
        .append(vec![transfer], condition.clone())
        .await
        .unwrap();

    // Re-using the now-stale condition after another matching event was committed must
    // fail: the condition's `after` position no longer reflects reality.
    let stale_transfer = InputEvent::new(
        "MoneyTransferred",
        tags! {"account_id" => "A", "to_account_id" => "B"},
        serde_json::to_vec(&serde_json::json!({"amount": 900})).unwrap(),
    )
    .unwrap();
    let result = store.append(vec![stale_transfer], condition).await;
    assert!(matches!(result, Err(Error::Concurrency { .. })));
}

// Batch ordering.
#[sqlx::test]
async fn batch_ordering(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let batch = vec![
        course_defined("C1", 10),
        course_defined("C2", 20),
        course_defined("C3", 30),
    ];
    let last_position = store
        .append(batch, AppendCondition::Unconditional)
        .await
        .unwrap();

    let all = store
        .query(&Query::match_all(), &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].position(), last_position - 2);
    assert_eq!(all[1].position(), last_position - 1);
    assert_eq!(all[2].position(), last_position);
    assert_eq!(all[0].data_as_json()["maxStudents"], 10);
    assert_eq!(all[1].data_as_json()["maxStudents"], 20);
    assert_eq!(all[2].data_as_json()["maxStudents"], 30);
}

// A stream dropped early releases its connection; the store keeps working.
#[sqlx::test]
async fn dropping_a_stream_early_does_not_wedge_the_store(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let batch: Vec<_> = (0..50).map(|i| course_defined(&format!("C{i}"), i)).collect();
    store
        .append(batch, AppendCondition::Unconditional)
        .await
        .unwrap();

    {
        let mut stream = store.query_stream(&Query::match_all(), &QueryOptions::new());
        for _ in 0..10 {
            stream.next().await.unwrap().unwrap();
        }
        // stream dropped here, before exhausting the cursor.
    }

    let all = store
        .query(&Query::match_all(), &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(all.len(), 50);
}

// Property: batch atomicity — a rejected append leaves nothing queryable.
#[sqlx::test]
async fn batch_atomicity_on_condition_violation(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let query = Query::single(QueryItem::of_types(["CourseDefined"]));

    store
        .append(vec![course_defined("C1", 1)], AppendCondition::Unconditional)
        .await
        .unwrap();

    let result = store
        .append(
            vec![course_defined("C2", 2), course_defined("C3", 3)],
            AppendCondition::fail_if_events_match(query.clone(), None),
        )
        .await;
    assert!(result.is_err());

    let all = store.query(&query, &QueryOptions::new()).await.unwrap();
    assert_eq!(all.len(), 1, "the rejected batch must not be visible");
}

// Property: subset semantics — a superset tag query does not match.
#[sqlx::test]
async fn subset_semantics_reject_supersets(pool: PgPool) {
    let store = PgEventStore::new(pool);
    store
        .append(
            vec![student_enrolled("C1", "S1")],
            AppendCondition::Unconditional,
        )
        .await
        .unwrap();

    let superset_query = Query::single(QueryItem::with_tags(
        tags! {"course_id" => "C1", "student_id" => "S1", "campus" => "X"},
    ));
    let result = store
        .query(&superset_query, &QueryOptions::new())
        .await
        .unwrap();
    assert!(result.is_empty());
}

// Property: projection determinism — materialized and streamed projections agree.
#[sqlx::test]
async fn projection_determinism(pool: PgPool) {
    let store = PgEventStore::new(pool);
    store
        .append(
            vec![
                course_defined("C1", 10),
                course_defined("C2", 20),
                course_defined("C1", 99),
            ],
            AppendCondition::Unconditional,
        )
        .await
        .unwrap();

    struct Count {
        query: Query,
    }
    impl Projector for Count {
        type State = u32;
        fn id(&self) -> &str {
            "count"
        }
        fn query(&self) -> &Query {
            &self.query
        }
        fn initial_state(&self) -> u32 {
            0
        }
        fn transition(&self, state: u32, _event: &StoredEvent) -> u32 {
            state + 1
        }
    }
    let make = || Count {
        query: Query::single(QueryItem::of_types(["CourseDefined"])),
    };

    let mut materialized = store.project(vec![erase(make())]).await.unwrap();
    let materialized_count = materialized.into_state::<u32>("count").unwrap();

    let mut stream = store.project_stream(vec![erase(make())]);
    while stream.next().await.transpose().unwrap().is_some() {}
    let mut streamed_decision = stream.into_decision();
    let streamed_count = streamed_decision.into_state::<u32>("count").unwrap();

    assert_eq!(materialized_count, 3);
    assert_eq!(materialized_count, streamed_count);
}

// Validation: an empty batch and an oversized batch are rejected before any I/O.
#[sqlx::test]
async fn append_validates_batch_size(pool: PgPool) {
    use dcb_postgres::Config;

    let store = PgEventStore::with_config(pool, Config::new().max_batch_size(2));

    let empty = store.append(vec![], AppendCondition::Unconditional).await;
    assert_eq!(empty.unwrap_err().kind(), ErrorKind::Validation);

    let oversized = store
        .append(
            vec![
                course_defined("C1", 1),
                course_defined("C2", 2),
                course_defined("C3", 3),
            ],
            AppendCondition::Unconditional,
        )
        .await;
    assert_eq!(oversized.unwrap_err().kind(), ErrorKind::Validation);

    let all = store.query(&Query::match_all(), &QueryOptions::new()).await.unwrap();
    assert!(all.is_empty());
}
