use migrations::Migrator;
use posting_engine::{config::AppConfig, db};
use sea_orm::{ConnectionTrait, Statement};
use sea_orm_migration::MigratorTrait;

async fn sqlite() -> sea_orm::DatabaseConnection {
    let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    db::establish_connection_from_app_config(&cfg)
        .await
        .expect("open sqlite")
}

#[tokio::test]
async fn schema_applies_on_sqlite_and_is_idempotent() {
    let conn = sqlite().await;
    db::run_migrations(&conn).await.expect("first run");
    assert!(Migrator::get_pending_migrations(&conn)
        .await
        .expect("pending")
        .is_empty());

    // A second run has nothing to do.
    db::run_migrations(&conn).await.expect("second run");

    for table in [
        "outbox_events",
        "processed_events",
        "documents",
        "journal_lines",
        "inventory_batches",
        "exception_items",
        "recurring_journal_rules",
    ] {
        let row = conn
            .query_one(Statement::from_string(
                conn.get_database_backend(),
                format!("SELECT count(*) AS n FROM sqlite_master WHERE type = 'table' AND name = '{table}'"),
            ))
            .await
            .expect("query sqlite_master")
            .expect("one row");
        let n: i64 = row.try_get("", "n").expect("count column");
        assert_eq!(n, 1, "missing table {table}");
    }
}
