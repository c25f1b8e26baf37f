use common::types::SqlParam;
use serde_json::json;
use shared_clients::postgres::PostgresStore;
use shared_clients::{QueryStore, StoreError};
use test_utils::setup_postgres;

#[tokio::test]
#[ignore = "requires docker"]
async fn runs_parameterized_select_and_reports_missing_columns() -> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres().await?;
    let store = PostgresStore::connect(pg.host, pg.port_u16(), pg.db_name, pg.user, pg.password, Some(30)).await?;

    let conn_str = format!(
        "host={} port={} user={} password={} dbname={}",
        pg.host, pg.port, pg.user, pg.password, pg.db_name
    );
    let (client, connection) = tokio_postgres::connect(&conn_str, tokio_postgres::NoTls).await?;
    tokio::spawn(connection);
    client
        .batch_execute("CREATE TABLE orders (id int PRIMARY KEY, total numeric, placed_at timestamptz)")
        .await?;

    let outcome = store
        .execute("SELECT 1::int AS id, $1::text AS label", &[SqlParam::from("north")])
        .await?;
    assert_eq!(outcome.row_count, 1);
    assert_eq!(outcome.columns, vec!["id", "label"]);
    assert_eq!(outcome.rows[0].get("label"), Some(&json!("north")));

    let empty = store.execute("SELECT id, total FROM orders", &[]).await?;
    assert!(empty.is_empty());
    assert_eq!(empty.columns, vec!["id", "total"]);

    let err = store.execute("SELECT foo FROM orders", &[]).await.unwrap_err();
    assert!(matches!(err, StoreError::Query { .. }));
    assert_eq!(err.message(), "column \"foo\" does not exist");

    client
        .batch_execute(
            "CREATE TABLE customers (id int PRIMARY KEY); \
             INSERT INTO customers VALUES (7); \
             INSERT INTO orders VALUES (1, 12.5, now())",
        )
        .await?;
    let joined = store
        .execute(
            "SELECT o.id, c.id FROM orders o CROSS JOIN customers c -- one pair",
            &[],
        )
        .await?;
    assert_eq!(joined.columns, vec!["id", "id_2"]);
    assert_eq!(joined.rows[0].get("id"), Some(&json!(1)));
    assert_eq!(joined.rows[0].get("id_2"), Some(&json!(7)));
    Ok(())
}
