//! Boundary to the hook engine.
//!
//! The engine owns registration order and chaining; the adapter only supplies one handler per
//! hook category through [`HookRegistry`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::dispatch::SqlAdapter;
use crate::request::Request;

/// Hook categories the adapter services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Begin,
    BeginNested,
    Commit,
    Rollback,
    Prepare,
    Query,
    Insert,
    Exec,
    StatementQuery,
    StatementInsert,
    StatementExec,
    StatementClose,
    RowsNext,
    RowsClose,
    Ping,
    ConnClose,
}

impl Hook {
    /// Every hook registered for single-level transactions.
    pub const SINGLE: [Hook; 15] = [
        Hook::Begin,
        Hook::Commit,
        Hook::Rollback,
        Hook::Prepare,
        Hook::Query,
        Hook::Insert,
        Hook::Exec,
        Hook::StatementQuery,
        Hook::StatementInsert,
        Hook::StatementExec,
        Hook::StatementClose,
        Hook::RowsNext,
        Hook::RowsClose,
        Hook::Ping,
        Hook::ConnClose,
    ];
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Whether the engine should keep running the hook chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop the chain; the request carries the error.
    Halt,
}

/// One link of a hook chain.
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn call(&self, ctx: &Context, req: &mut Request) -> Flow;
}

/// Registration surface of the hook engine.
pub trait HookRegistry {
    /// Put `handler` at the front of the chain for `hook`.
    fn prepend(&mut self, hook: Hook, handler: Arc<dyn HookHandler>);
}

struct AdapterHook {
    adapter: Arc<SqlAdapter>,
    hook: Hook,
}

#[async_trait]
impl HookHandler for AdapterHook {
    async fn call(&self, ctx: &Context, req: &mut Request) -> Flow {
        self.adapter.handle(self.hook, ctx, req).await
    }
}

/// Register the adapter for every hook of a single-level transaction model.
pub fn install_single(registry: &mut dyn HookRegistry, adapter: &Arc<SqlAdapter>) {
    for hook in Hook::SINGLE {
        registry.prepend(
            hook,
            Arc::new(AdapterHook {
                adapter: Arc::clone(adapter),
                hook,
            }),
        );
    }
}

/// Like [`install_single`], plus `BeginNested`.
pub fn install_nested(registry: &mut dyn HookRegistry, adapter: &Arc<SqlAdapter>) {
    install_single(registry, adapter);
    registry.prepend(
        Hook::BeginNested,
        Arc::new(AdapterHook {
            adapter: Arc::clone(adapter),
            hook: Hook::BeginNested,
        }),
    );
}
