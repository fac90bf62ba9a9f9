mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use sql_engine_adapter::prelude::*;
use support::TestResult;
use support::hook_chain::{Counter, HookChain};
use support::recording_driver::recording_adapter;

#[test]
fn single_install_skips_nested_begin() {
    let (adapter, _recorder) = recording_adapter(PlaceholderStyle::Question);
    let adapter = Arc::new(adapter);
    let mut chain = HookChain::default();
    install_single(&mut chain, &adapter);

    for hook in Hook::SINGLE {
        assert_eq!(chain.len(hook), 1, "{hook} should be registered once");
    }
    assert_eq!(chain.len(Hook::BeginNested), 0);
}

#[test]
fn nested_install_adds_nested_begin() {
    let (adapter, _recorder) = recording_adapter(PlaceholderStyle::Question);
    let adapter = Arc::new(adapter);
    let mut chain = HookChain::default();
    install_nested(&mut chain, &adapter);

    assert_eq!(chain.len(Hook::BeginNested), 1);
    assert_eq!(chain.len(Hook::Begin), 1);
    assert_eq!(chain.len(Hook::ConnClose), 1);
}

#[tokio::test]
async fn halt_stops_later_handlers() -> TestResult {
    let (adapter, recorder) = recording_adapter(PlaceholderStyle::Question);
    let adapter = Arc::new(adapter);
    let counter = Arc::new(Counter::default());
    let mut chain = HookChain::default();
    chain.prepend(Hook::Commit, counter.clone());
    chain.prepend(Hook::Query, counter.clone());
    install_single(&mut chain, &adapter);

    let ctx = Context::background();
    let mut req = Request::new().with_query(Query::without_params("SELECT 1"));

    // no transaction attached: the adapter halts and the counter never runs
    assert_eq!(chain.run(Hook::Commit, &ctx, &mut req).await, Flow::Halt);
    assert!(matches!(
        req.take_error(),
        Some(SqlAdapterError::TransactionState(_))
    ));
    assert_eq!(counter.hits.load(Ordering::SeqCst), 0);

    assert_eq!(chain.run(Hook::Query, &ctx, &mut req).await, Flow::Continue);
    assert_eq!(counter.hits.load(Ordering::SeqCst), 1);
    assert!(req.rows().is_some());
    assert_eq!(recorder.count("query"), 1);
    Ok(())
}

#[tokio::test]
async fn full_transaction_through_the_chain() -> TestResult {
    let (adapter, recorder) = recording_adapter(PlaceholderStyle::Postgres);
    let adapter = Arc::new(adapter);
    let mut chain = HookChain::default();
    install_nested(&mut chain, &adapter);

    let ctx = Context::background();
    let mut req = Request::new()
        .with_query(Query::positional(
            "UPDATE t SET a = ? WHERE id = ?",
            vec![RowValues::Int(1), RowValues::Int(2)],
        ))
        .with_tx_options(TxOptions::default().with_isolation(IsolationLevel::RepeatableRead));

    for hook in [Hook::BeginNested, Hook::Exec, Hook::Commit] {
        assert_eq!(chain.run(hook, &ctx, &mut req).await, Flow::Continue, "{hook}");
    }
    assert_eq!(req.executor().unwrap().state(), TxState::Committed);
    assert_eq!(
        recorder.calls()[1].sql.as_deref(),
        Some("UPDATE t SET a = $1 WHERE id = $2")
    );
    Ok(())
}
