#![allow(dead_code)]

pub mod hook_chain;
pub mod recording_driver;

use std::error::Error;

use sql_engine_adapter::prelude::*;

pub type TestResult = Result<(), Box<dyn Error>>;

/// Route adapter logs to the test harness; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Run `hook` and fail the test with the recorded error if it halted.
pub async fn expect_continue(
    adapter: &SqlAdapter,
    hook: Hook,
    ctx: &Context,
    req: &mut Request,
) -> Result<(), SqlAdapterError> {
    match adapter.handle(hook, ctx, req).await {
        Flow::Continue => Ok(()),
        Flow::Halt => Err(req
            .take_error()
            .unwrap_or_else(|| panic!("{hook} halted without recording an error"))),
    }
}

/// Run `hook`, expect it to halt, and hand back the recorded error.
pub async fn expect_halt(
    adapter: &SqlAdapter,
    hook: Hook,
    ctx: &Context,
    req: &mut Request,
) -> SqlAdapterError {
    assert_eq!(
        adapter.handle(hook, ctx, req).await,
        Flow::Halt,
        "{hook} should have halted"
    );
    req.take_error().expect("halted hooks record an error")
}
