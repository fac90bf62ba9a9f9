#![cfg(feature = "sqlite")]

mod support;

use std::time::Duration;

use sql_engine_adapter::prelude::*;
use support::{TestResult, expect_continue, expect_halt, init_tracing};
use tempfile::TempDir;

async fn adapter_with(
    dir: &TempDir,
    pool_size: u32,
    style: PlaceholderStyle,
) -> Result<SqlAdapter, SqlAdapterError> {
    init_tracing();
    let db_path = dir.path().join("adapter.db");
    let config = AdapterConfig::sqlite(
        SqliteOptionsBuilder::new(db_path.to_string_lossy())
            .pool_size(pool_size)
            .finish(),
    )
    .with_placeholder_style(style);
    let conn = Connection::from_config(&config).await?;
    let adapter = SqlAdapter::new(conn);

    let ctx = Context::background();
    let mut req = Request::new().with_query(Query::without_params(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)",
    ));
    expect_continue(&adapter, Hook::Exec, &ctx, &mut req).await?;
    Ok(adapter)
}

async fn count_rows(adapter: &SqlAdapter, ctx: &Context) -> Result<i64, SqlAdapterError> {
    let mut rows = adapter
        .connection()
        .query(ctx, &Query::without_params("SELECT COUNT(*) FROM t"))
        .await?;
    let row = rows.next(ctx).await?.expect("count row");
    let (n,): (i64,) = row.scan()?;
    rows.close(ctx).await?;
    Ok(n)
}

#[tokio::test]
async fn prepared_insert_inside_transaction() -> TestResult {
    let dir = TempDir::new()?;
    let adapter = adapter_with(&dir, 2, PlaceholderStyle::Question).await?;
    let ctx = Context::background();

    let mut req = Request::new().with_query(Query::without_params("INSERT INTO t (id) VALUES (?)"));
    expect_continue(&adapter, Hook::Begin, &ctx, &mut req).await?;
    expect_continue(&adapter, Hook::Prepare, &ctx, &mut req).await?;
    assert!(req.statement().unwrap().in_transaction());

    req.set_parameters(Parameters::from(vec![RowValues::Int(5)]));
    expect_continue(&adapter, Hook::StatementInsert, &ctx, &mut req).await?;
    let inserted = req.insert_result().unwrap();
    assert_eq!(inserted.rows_affected(), 1);
    assert_eq!(inserted.last_insert_id(), Some(5));

    expect_continue(&adapter, Hook::StatementClose, &ctx, &mut req).await?;
    expect_continue(&adapter, Hook::Commit, &ctx, &mut req).await?;
    let err = expect_halt(&adapter, Hook::Commit, &ctx, &mut req).await;
    assert!(matches!(err, SqlAdapterError::TransactionState(_)));

    let mut req = Request::new().with_query(Query::positional(
        "SELECT id FROM t WHERE id = ?",
        vec![RowValues::Int(5)],
    ));
    expect_continue(&adapter, Hook::Query, &ctx, &mut req).await?;
    expect_continue(&adapter, Hook::RowsNext, &ctx, &mut req).await?;
    let (id,): (i64,) = req.row().expect("inserted row").scan()?;
    assert_eq!(id, 5);
    expect_continue(&adapter, Hook::RowsNext, &ctx, &mut req).await?;
    assert!(req.row().is_none());
    expect_continue(&adapter, Hook::RowsClose, &ctx, &mut req).await?;
    Ok(())
}

#[tokio::test]
async fn rollback_discards_writes() -> TestResult {
    let dir = TempDir::new()?;
    let adapter = adapter_with(&dir, 2, PlaceholderStyle::Question).await?;
    let ctx = Context::background();

    let mut req = Request::new().with_query(Query::positional(
        "INSERT INTO t (id, name) VALUES (?, ?)",
        vec![RowValues::Int(1), RowValues::Text("gone".into())],
    ));
    expect_continue(&adapter, Hook::Begin, &ctx, &mut req).await?;
    expect_continue(&adapter, Hook::Insert, &ctx, &mut req).await?;
    expect_continue(&adapter, Hook::Rollback, &ctx, &mut req).await?;
    assert_eq!(req.executor().unwrap().state(), TxState::RolledBack);

    assert_eq!(count_rows(&adapter, &ctx).await?, 0);
    Ok(())
}

#[tokio::test]
async fn named_parameters_with_numbered_placeholders() -> TestResult {
    let dir = TempDir::new()?;
    let adapter = adapter_with(&dir, 2, PlaceholderStyle::Sqlite).await?;
    let ctx = Context::background();

    let mut req = Request::new().with_query(Query::named(
        "INSERT INTO t (id, name) VALUES (:id, :name)",
        [
            ("id", RowValues::Int(9)),
            ("name", RowValues::Text("nine".into())),
        ],
    ));
    expect_continue(&adapter, Hook::Exec, &ctx, &mut req).await?;
    assert_eq!(req.result().unwrap().rows_affected(), 1);

    req.set_query(Query::named(
        "SELECT name FROM t WHERE id = :id OR name = :name",
        [
            ("id", RowValues::Int(9)),
            ("name", RowValues::Text("nine".into())),
        ],
    ));
    expect_continue(&adapter, Hook::Query, &ctx, &mut req).await?;
    expect_continue(&adapter, Hook::RowsNext, &ctx, &mut req).await?;
    let row = req.row().expect("named row");
    assert_eq!(row.get_by_name::<String>("name")?, "nine");
    expect_continue(&adapter, Hook::RowsClose, &ctx, &mut req).await?;
    Ok(())
}

#[tokio::test]
async fn prepared_statement_reused_with_new_values() -> TestResult {
    let dir = TempDir::new()?;
    let adapter = adapter_with(&dir, 2, PlaceholderStyle::Sqlite).await?;
    let ctx = Context::background();

    let mut stmt = adapter
        .connection()
        .prepare(&ctx, &Query::without_params("INSERT INTO t (id, name) VALUES (?, ?)"))
        .await?;
    assert_eq!(stmt.sql(), "INSERT INTO t (id, name) VALUES (?1, ?2)");
    for id in 1..=3 {
        let params = Parameters::from(vec![RowValues::Int(id), RowValues::Text(format!("n{id}"))]);
        let res = stmt.exec(&ctx, &params).await?;
        assert_eq!(res.rows_affected(), 1);
    }
    stmt.close(&ctx).await?;

    assert_eq!(count_rows(&adapter, &ctx).await?, 3);
    Ok(())
}

#[tokio::test]
async fn dropped_transaction_is_rolled_back() -> TestResult {
    let dir = TempDir::new()?;
    let adapter = adapter_with(&dir, 1, PlaceholderStyle::Question).await?;
    let ctx = Context::background();

    {
        let mut req = Request::new().with_query(Query::positional(
            "INSERT INTO t (id) VALUES (?)",
            vec![RowValues::Int(77)],
        ));
        expect_continue(&adapter, Hook::Begin, &ctx, &mut req).await?;
        expect_continue(&adapter, Hook::Insert, &ctx, &mut req).await?;
    }

    // the only pooled connection comes back once the rollback has run
    assert_eq!(count_rows(&adapter, &ctx).await?, 0);
    Ok(())
}

#[tokio::test]
async fn scan_arity_mismatch_is_scan_error() -> TestResult {
    let dir = TempDir::new()?;
    let adapter = adapter_with(&dir, 2, PlaceholderStyle::Question).await?;
    let ctx = Context::background();

    let mut rows = adapter
        .connection()
        .query(&ctx, &Query::without_params("SELECT 1, 'two'"))
        .await?;
    let row = rows.next(&ctx).await?.expect("literal row");
    assert!(matches!(row.scan::<(i64,)>(), Err(SqlAdapterError::ScanError(_))));
    assert!(matches!(row.scan::<(i64, i64)>(), Err(SqlAdapterError::ScanError(_))));
    let (one, two): (i64, String) = row.scan()?;
    assert_eq!((one, two.as_str()), (1, "two"));
    Ok(())
}

#[tokio::test]
async fn native_failures_are_classified() -> TestResult {
    let dir = TempDir::new()?;
    let adapter = adapter_with(&dir, 2, PlaceholderStyle::Question).await?;
    let ctx = Context::background();

    let mut req = Request::new().with_query(Query::without_params("SELECT * FROM missing_table"));
    let err = expect_halt(&adapter, Hook::Prepare, &ctx, &mut req).await;
    assert!(matches!(err, SqlAdapterError::PrepareFailure { .. }));

    let err = expect_halt(&adapter, Hook::Query, &ctx, &mut req).await;
    assert!(matches!(
        err,
        SqlAdapterError::ExecutionFailure {
            op: Operation::Query,
            ..
        }
    ));

    expect_continue(&adapter, Hook::Ping, &ctx, &mut req).await?;
    Ok(())
}

#[tokio::test]
async fn timed_out_insert_inside_transaction_commits_nothing() -> TestResult {
    let dir = TempDir::new()?;
    let adapter = adapter_with(&dir, 1, PlaceholderStyle::Question).await?;
    let background = Context::background();

    let mut req = Request::new().with_query(Query::without_params(
        "INSERT INTO t (id) \
         WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 3000000) \
         SELECT x FROM c",
    ));
    expect_continue(&adapter, Hook::Begin, &background, &mut req).await?;

    let ctx = Context::background().with_timeout(Duration::from_millis(20));
    let err = expect_halt(&adapter, Hook::Insert, &ctx, &mut req).await;
    assert!(
        matches!(err, SqlAdapterError::DeadlineExceeded(Operation::Insert)),
        "{err}"
    );
    assert_eq!(req.executor().unwrap().state(), TxState::Aborted);

    let err = expect_halt(&adapter, Hook::Commit, &background, &mut req).await;
    assert!(matches!(err, SqlAdapterError::TransactionState(_)));

    // the single pooled connection only comes back after the rollback
    assert_eq!(count_rows(&adapter, &background).await?, 0);
    Ok(())
}

#[tokio::test]
async fn connection_statement_does_not_hold_a_pool_slot() -> TestResult {
    let dir = TempDir::new()?;
    let adapter = adapter_with(&dir, 1, PlaceholderStyle::Question).await?;
    let ctx = Context::background();

    let mut stmt = adapter
        .connection()
        .prepare(&ctx, &Query::without_params("INSERT INTO t (id) VALUES (?)"))
        .await?;
    assert_eq!(count_rows(&adapter, &ctx).await?, 0);

    stmt.exec(&ctx, &Parameters::from(vec![RowValues::Int(1)])).await?;
    assert_eq!(count_rows(&adapter, &ctx).await?, 1);
    stmt.exec(&ctx, &Parameters::from(vec![RowValues::Int(2)])).await?;
    stmt.close(&ctx).await?;
    assert_eq!(count_rows(&adapter, &ctx).await?, 2);
    Ok(())
}

#[tokio::test]
async fn closed_connection_releases_its_pool() -> TestResult {
    let dir = TempDir::new()?;
    let adapter = adapter_with(&dir, 2, PlaceholderStyle::Question).await?;
    let ctx = Context::background();

    let mut req = Request::new().with_query(Query::without_params("SELECT 1"));
    expect_continue(&adapter, Hook::Prepare, &ctx, &mut req).await?;
    expect_continue(&adapter, Hook::ConnClose, &ctx, &mut req).await?;
    assert!(adapter.connection().is_closed());

    let err = expect_halt(&adapter, Hook::Query, &ctx, &mut req).await;
    assert!(matches!(
        err,
        SqlAdapterError::ConnectionFailure {
            op: Operation::Query,
            source: DriverError::Closed,
        }
    ));
    let err = expect_halt(&adapter, Hook::StatementQuery, &ctx, &mut req).await;
    assert!(matches!(err, SqlAdapterError::ConnectionFailure { .. }));
    let err = expect_halt(&adapter, Hook::ConnClose, &ctx, &mut req).await;
    assert!(matches!(err, SqlAdapterError::ConnectionFailure { .. }));

    // statements still release their own handle to the pool
    expect_continue(&adapter, Hook::StatementClose, &ctx, &mut req).await?;
    Ok(())
}
