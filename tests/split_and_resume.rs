//! Partition split handling and continuation resume tests.

mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use stratus_client::continuation::{CompositeContinuation, RangeContinuation};
use stratus_client::planner::{PartitionedQueryExecutionInfo, SortDirection};
use stratus_client::query::{execute_query, QueryError};
use stratus_client::types::{FeedOptions, FeedResponse};
use stratus_client::SqlQuery;

use common::*;

fn cross_partition_plan() -> PartitionedQueryExecutionInfo {
    let mut plan = PartitionedQueryExecutionInfo::default();
    plan.requires_cross_partition = true;
    plan
}

/// A mid-query split is absorbed: the output equals the parent range's
/// logical contents and no failure is user-visible.
#[tokio::test]
async fn test_partition_split_mid_query() {
    let executor = ScriptedExecutor::new()
        .script(
            "R",
            ScriptedRange::serving(vec![vec![json!("a1"), json!("a2")]]).then_gone(),
        )
        .script("R1", ScriptedRange::serving(vec![vec![json!("b1")]]).starting_at(1))
        .script("R2", ScriptedRange::serving(vec![vec![json!("c1")]]).starting_at(1));

    let routing = StaticRoutingMap::with_ranges(vec![range("R", "", "FF")]).split(
        "R",
        vec![range("R1", "", "80"), range("R2", "80", "FF")],
    );

    let deps = deps(executor, routing, cross_partition_plan());
    let options = FeedOptions::new().with_max_item_count(2).cross_partition();

    let mut stream = execute_query(&deps, "coll1", SqlQuery::new("SELECT * FROM c"), options)
        .await
        .unwrap();
    let pages = collect_pages(&mut stream).await;

    let mut items: Vec<String> = all_items(&pages)
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    // The pre-split page is ordered; the children's output order is
    // unspecified without ORDER BY.
    assert_eq!(&items[..2], &["a1".to_string(), "a2".to_string()]);
    items.sort();
    assert_eq!(items, vec!["a1", "a2", "b1", "c1"]);
    assert_eq!(deps.metrics.splits_resolved(), 1);
    assert!(pages.last().unwrap().continuation_token().is_none());
}

fn scenario_ranges() -> StaticRoutingMap {
    StaticRoutingMap::with_ranges(vec![
        range("0", "", "55"),
        range("1", "55", "AA"),
        range("2", "AA", "FF"),
    ])
}

fn scenario_executor() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .script("0", ScriptedRange::serving(vec![vec![json!("a"), json!("b")]]))
        .script("1", ScriptedRange::serving(vec![vec![json!("c"), json!("d")]]))
        .script("2", ScriptedRange::serving(vec![vec![json!("e"), json!("f")]]))
}

/// Resuming from the token emitted after page K yields exactly pages
/// K+1..end.
#[tokio::test]
async fn test_parallel_resume_from_every_boundary() {
    let deps_full = deps(scenario_executor(), scenario_ranges(), cross_partition_plan());
    let options = FeedOptions::new().with_max_item_count(2).cross_partition();

    let mut stream = execute_query(
        &deps_full,
        "coll1",
        SqlQuery::new("SELECT * FROM c"),
        options.clone(),
    )
    .await
    .unwrap();
    let full_run = collect_pages(&mut stream).await;
    assert_eq!(full_run.len(), 3);

    for boundary in 0..full_run.len() - 1 {
        let token = full_run[boundary]
            .continuation_token()
            .expect("non-final pages carry tokens");

        let deps_resume = deps(scenario_executor(), scenario_ranges(), cross_partition_plan());
        let mut resumed = execute_query(
            &deps_resume,
            "coll1",
            SqlQuery::new("SELECT * FROM c"),
            options.clone().with_continuation(token),
        )
        .await
        .unwrap();
        let resumed_pages = collect_pages(&mut resumed).await;

        let expected: Vec<Value> = all_items(&full_run[boundary + 1..]);
        assert_eq!(all_items(&resumed_pages), expected, "boundary {boundary}");
    }
}

fn int_doc(n: i64, rid: &str) -> Value {
    order_by_doc(&[json!(n)], json!({ "n": n }), rid)
}

fn order_by_executor() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .script(
            "0",
            ScriptedRange::serving(vec![
                vec![int_doc(1, "r01"), int_doc(3, "r03")],
                vec![int_doc(5, "r05")],
            ]),
        )
        .script(
            "1",
            ScriptedRange::serving(vec![
                vec![int_doc(2, "r02"), int_doc(4, "r04")],
                vec![int_doc(6, "r06")],
            ]),
        )
}

fn order_by_plan() -> PartitionedQueryExecutionInfo {
    let mut plan = cross_partition_plan();
    plan.order_by_expressions = vec!["c.k0".to_string()];
    plan.order_by_directions = vec![SortDirection::Asc];
    plan.rewritten_query =
        "SELECT * FROM c WHERE {resume-filter} ORDER BY c.k0".to_string();
    plan
}

fn two_range_routing() -> StaticRoutingMap {
    StaticRoutingMap::with_ranges(vec![range("0", "", "80"), range("1", "80", "FF")])
}

fn items_json(pages: &[FeedResponse]) -> String {
    serde_json::to_string(&all_items(pages)).unwrap()
}

/// ORDER BY resume: the resumed stream is byte-identical to the suffix of
/// the original run, and the refetch carries the resume filter.
#[tokio::test]
async fn test_order_by_resume_is_exact() {
    let options = FeedOptions::new().with_max_item_count(2).cross_partition();

    let deps_full = deps(order_by_executor(), two_range_routing(), order_by_plan());
    let mut stream = execute_query(
        &deps_full,
        "coll1",
        SqlQuery::new("SELECT * FROM c ORDER BY c.k0"),
        options.clone(),
    )
    .await
    .unwrap();
    let full_run = collect_pages(&mut stream).await;
    let flattened: Vec<i64> = all_items(&full_run)
        .iter()
        .map(|v| v["n"].as_i64().unwrap())
        .collect();
    assert_eq!(flattened, vec![1, 2, 3, 4, 5, 6]);

    let token = full_run[0].continuation_token().expect("first page has a token");

    let resumed_executor = Arc::new(order_by_executor());
    let deps_resume = deps_shared(
        Arc::clone(&resumed_executor),
        two_range_routing(),
        order_by_plan(),
    );
    let mut resumed = execute_query(
        &deps_resume,
        "coll1",
        SqlQuery::new("SELECT * FROM c ORDER BY c.k0"),
        options.clone().with_continuation(token),
    )
    .await
    .unwrap();
    let resumed_pages = collect_pages(&mut resumed).await;

    assert_eq!(items_json(&resumed_pages), items_json(&full_run[1..]));

    // The refetch queries carried the strict resume filter.
    let filtered = resumed_executor
        .requests()
        .iter()
        .any(|request| request.query.text.contains("(c.k0 > 2)"));
    assert!(filtered, "resume requests must format the boundary filter");
}

/// A continuation whose range was split resumes by fanning the persisted
/// token out to both children.
#[tokio::test]
async fn test_resume_token_survives_split() {
    let persisted = CompositeContinuation::new(
        "coll1",
        vec![RangeContinuation {
            min: String::new(),
            max: "FF".to_string(),
            token: Some("idx:1".to_string()),
            order: None,
        }],
    );

    let executor = ScriptedExecutor::new()
        .script("L", ScriptedRange::serving(vec![vec![json!("left")]]).starting_at(1))
        .script("R", ScriptedRange::serving(vec![vec![json!("right")]]).starting_at(1));
    let routing = StaticRoutingMap::with_ranges(vec![range("L", "", "80"), range("R", "80", "FF")]);

    let deps = deps(executor, routing, cross_partition_plan());
    let mut stream = execute_query(
        &deps,
        "coll1",
        SqlQuery::new("SELECT * FROM c"),
        FeedOptions::new()
            .cross_partition()
            .with_continuation(persisted.to_token()),
    )
    .await
    .unwrap();
    let pages = collect_pages(&mut stream).await;

    assert_eq!(all_items(&pages), vec![json!("left"), json!("right")]);
}

/// A continuation whose ranges were merged away cannot resume.
#[tokio::test]
async fn test_resume_token_rejected_after_merge() {
    let persisted = CompositeContinuation::new(
        "coll1",
        vec![
            RangeContinuation {
                min: String::new(),
                max: "80".to_string(),
                token: Some("idx:1".to_string()),
                order: None,
            },
            RangeContinuation {
                min: "80".to_string(),
                max: "FF".to_string(),
                token: None,
                order: None,
            },
        ],
    );

    let executor = ScriptedExecutor::new();
    let routing = StaticRoutingMap::with_ranges(vec![range("M", "", "FF")]);
    let deps = deps(executor, routing, cross_partition_plan());

    let result = execute_query(
        &deps,
        "coll1",
        SqlQuery::new("SELECT * FROM c"),
        FeedOptions::new()
            .cross_partition()
            .with_continuation(persisted.to_token()),
    )
    .await;

    assert!(matches!(result, Err(QueryError::InvalidContinuation(_))));
}

/// Unknown token versions are rejected up front.
#[tokio::test]
async fn test_future_token_version_rejected() {
    let token = r#"{"v":9,"rid":"coll1","ranges":[{"min":"","max":"FF","token":null}]}"#;

    let executor = ScriptedExecutor::new();
    let routing = StaticRoutingMap::with_ranges(vec![range("0", "", "FF")]);
    let deps = deps(executor, routing, cross_partition_plan());

    let result = execute_query(
        &deps,
        "coll1",
        SqlQuery::new("SELECT * FROM c"),
        FeedOptions::new().cross_partition().with_continuation(token),
    )
    .await;

    assert!(matches!(result, Err(QueryError::InvalidContinuation(_))));
}

/// A token issued for another collection is rejected.
#[tokio::test]
async fn test_foreign_collection_token_rejected() {
    let persisted = CompositeContinuation::new(
        "other-collection",
        vec![RangeContinuation {
            min: String::new(),
            max: "FF".to_string(),
            token: None,
            order: None,
        }],
    );

    let executor = ScriptedExecutor::new();
    let routing = StaticRoutingMap::with_ranges(vec![range("0", "", "FF")]);
    let deps = deps(executor, routing, cross_partition_plan());

    let result = execute_query(
        &deps,
        "coll1",
        SqlQuery::new("SELECT * FROM c"),
        FeedOptions::new()
            .cross_partition()
            .with_continuation(persisted.to_token()),
    )
    .await;

    assert!(matches!(result, Err(QueryError::InvalidContinuation(_))));
}
