use catalog::SchemaCache;
use common::types::ChatMessage;
use engine::{Pipeline, PipelineSettings};
use serde_json::json;
use shared_clients::llm::LlmError;
use std::sync::Arc;
use test_utils::fixtures::{outcome, sales_snapshot};
use test_utils::{ScriptedGateway, ScriptedStore};

const IDENTIFY_ORDERS: &str = r#"{"tables": ["orders"], "reasoning": "order totals"}"#;

fn pipeline(gateway: &Arc<ScriptedGateway>, store: &Arc<ScriptedStore>) -> (Pipeline, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let cache = SchemaCache::new(dir.path());
    cache.insert(sales_snapshot());
    let pipeline = Pipeline::new(
        cache,
        "sales",
        gateway.clone(),
        store.clone(),
        PipelineSettings::default(),
    );
    (pipeline, dir)
}

#[tokio::test]
async fn answers_a_question_end_to_end() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(IDENTIFY_ORDERS)
            .reply("```sql\nSELECT sum(total) AS revenue FROM orders\n```")
            .reply("Revenue so far is 1200."),
    );
    let store = Arc::new(ScriptedStore::new().rows(outcome(vec![json!({"revenue": 1200})])));
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("What is our revenue?", &[]).await;
    assert!(response.success);
    assert_eq!(response.answer, "Revenue so far is 1200.");
    assert_eq!(
        response.sql_query.as_deref(),
        Some("SELECT sum(total) AS revenue FROM orders")
    );
    assert_eq!(response.query_result.unwrap().row_count, 1);
    assert_eq!(store.executed(), vec!["SELECT sum(total) AS revenue FROM orders"]);

    let calls = gateway.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].temperature, 0.1);
    assert_eq!(calls[2].temperature, 0.3);
    // generation sees only the identified table's columns
    let generation = calls[1].prompt();
    assert!(generation.contains("Table orders"));
    assert!(!generation.contains("Table customers"));
    assert!(generation.contains("- invoices (year partitions: invoices_y2023)"));
}

#[tokio::test]
async fn empty_identification_stops_before_generation() {
    let gateway = Arc::new(ScriptedGateway::new().reply(r#"{"tables": [], "reasoning": "unclear"}"#));
    let store = Arc::new(ScriptedStore::new());
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("What's the weather?", &[]).await;
    assert!(!response.success);
    assert!(response.sql_query.is_none());
    assert!(response.query_result.is_none());
    assert!(response.answer.contains("Available tables include"));
    assert_eq!(gateway.call_count(), 1);
    assert!(store.executed().is_empty());
}

#[tokio::test]
async fn hallucinated_tables_count_as_empty_identification() {
    let gateway = Arc::new(ScriptedGateway::new().reply(r#"{"tables": ["weather"], "reasoning": "x"}"#));
    let store = Arc::new(ScriptedStore::new());
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("What's the weather?", &[]).await;
    assert!(!response.success);
    assert_eq!(gateway.call_count(), 1);
}

#[tokio::test]
async fn identification_timeout_is_treated_as_no_tables() {
    let gateway = Arc::new(ScriptedGateway::new().time_out());
    let store = Arc::new(ScriptedStore::new());
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("revenue?", &[]).await;
    assert!(!response.success);
    assert!(response.sql_query.is_none());
    assert_eq!(gateway.call_count(), 1);
}

#[tokio::test]
async fn unknown_column_is_repaired_once() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(IDENTIFY_ORDERS)
            .reply("SELECT foo FROM orders")
            .reply("SELECT total FROM orders")
            .reply("There are two orders, worth 5 and 7."),
    );
    let store = Arc::new(
        ScriptedStore::new()
            .error("column \"foo\" does not exist")
            .rows(outcome(vec![json!({"total": 5}), json!({"total": 7})])),
    );
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("order totals", &[]).await;
    assert!(response.success);
    assert_eq!(response.sql_query.as_deref(), Some("SELECT total FROM orders"));
    assert_eq!(
        store.executed(),
        vec!["SELECT foo FROM orders", "SELECT total FROM orders"]
    );
    assert_eq!(gateway.call_count(), 4);
}

#[tokio::test]
async fn second_failure_is_final() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(IDENTIFY_ORDERS)
            .reply("SELECT foo FROM orders")
            .reply("SELECT bar FROM orders")
            .reply("SELECT baz FROM orders"),
    );
    let store = Arc::new(
        ScriptedStore::new()
            .error("column \"foo\" does not exist")
            .error("column \"bar\" does not exist")
            .rows(outcome(vec![])),
    );
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("order totals", &[]).await;
    assert!(!response.success);
    assert_eq!(store.executed().len(), 2);
    assert_eq!(gateway.call_count(), 3);
    assert_eq!(response.sql_query.as_deref(), Some("SELECT bar FROM orders"));
    assert!(response.answer.contains("column \"bar\" does not exist"));
}

#[tokio::test]
async fn repair_timeout_reports_the_failing_statement() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(IDENTIFY_ORDERS)
            .reply("SELECT foo FROM orders")
            .time_out(),
    );
    let store = Arc::new(ScriptedStore::new().error("column \"foo\" does not exist"));
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("order totals", &[]).await;
    assert!(!response.success);
    assert!(response.answer.contains("try rephrasing"));
    assert_eq!(response.sql_query.as_deref(), Some("SELECT foo FROM orders"));
    assert_eq!(store.executed().len(), 1);
}

#[tokio::test]
async fn zero_rows_give_no_results_narrative() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(IDENTIFY_ORDERS)
            .reply("SELECT * FROM orders WHERE total > 1000000"),
    );
    let store = Arc::new(ScriptedStore::new().rows(outcome(vec![])));
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("huge orders", &[]).await;
    assert!(response.success);
    assert!(response.answer.starts_with("No results were found"));
    assert_eq!(gateway.call_count(), 2);
    assert_eq!(response.query_result.unwrap().row_count, 0);
}

#[tokio::test]
async fn generated_write_is_rejected_without_execution() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(IDENTIFY_ORDERS)
            .reply("DELETE FROM orders"),
    );
    let store = Arc::new(ScriptedStore::new());
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("remove all orders", &[]).await;
    assert!(!response.success);
    assert!(response.answer.contains("only read-only queries are allowed"));
    assert_eq!(response.sql_query.as_deref(), Some("DELETE FROM orders"));
    assert!(store.executed().is_empty());
}

#[tokio::test]
async fn generation_timeout_asks_to_rephrase() {
    let gateway = Arc::new(ScriptedGateway::new().reply(IDENTIFY_ORDERS).time_out());
    let store = Arc::new(ScriptedStore::new());
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("order totals", &[]).await;
    assert!(!response.success);
    assert!(response.answer.contains("try rephrasing"));
    assert!(response.sql_query.is_none());
}

#[tokio::test]
async fn generation_protocol_error_is_a_generation_failure() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(IDENTIFY_ORDERS)
            .fail(LlmError::protocol(Some(429), "rate limited")),
    );
    let store = Arc::new(ScriptedStore::new());
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("order totals", &[]).await;
    assert!(!response.success);
    assert!(response.answer.starts_with("I couldn't write a query"));
}

#[tokio::test]
async fn refiner_failure_falls_back_to_row_listing() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(IDENTIFY_ORDERS)
            .reply("SELECT id, total FROM orders")
            .time_out(),
    );
    let store = Arc::new(ScriptedStore::new().rows(outcome(vec![
        json!({"id": 1, "total": 5}),
        json!({"id": 2, "total": 7}),
    ])));
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("list orders", &[]).await;
    assert!(response.success);
    assert_eq!(response.answer, "Found 2 rows:\n1. id: 1, total: 5\n2. id: 2, total: 7");
}

#[tokio::test]
async fn history_reaches_identification_and_generation() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .reply(IDENTIFY_ORDERS)
            .reply("SELECT count(*) FROM orders")
            .reply("Twelve."),
    );
    let store = Arc::new(ScriptedStore::new().rows(outcome(vec![json!({"count": 12})])));
    let (pipeline, _dir) = pipeline(&gateway, &store);
    let history = vec![
        ChatMessage::user("oldest turn"),
        ChatMessage::user("show me orders"),
        ChatMessage::assistant("Here are the orders."),
    ];

    pipeline.process_question("how many?", &history).await;
    for call in &gateway.calls()[..2] {
        let prompt = call.prompt();
        assert!(prompt.contains("show me orders"));
        assert!(!prompt.contains("oldest turn"));
    }
}

#[tokio::test]
async fn missing_snapshot_fails_softly() {
    let gateway = Arc::new(ScriptedGateway::new());
    let store = Arc::new(ScriptedStore::new());
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        SchemaCache::new(dir.path()),
        "sales",
        gateway.clone(),
        store,
        PipelineSettings::default(),
    );

    let response = pipeline.process_question("revenue?", &[]).await;
    assert!(!response.success);
    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn response_serializes_camel_case_with_nulls() {
    let gateway = Arc::new(ScriptedGateway::new().reply(r#"{"tables": []}"#));
    let store = Arc::new(ScriptedStore::new());
    let (pipeline, _dir) = pipeline(&gateway, &store);

    let response = pipeline.process_question("?", &[]).await;
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["success"], json!(false));
    assert_eq!(value["sqlQuery"], json!(null));
    assert_eq!(value["queryResult"], json!(null));
    assert!(value["answer"].is_string());
}
