//! A minimal sequential hook engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sql_engine_adapter::prelude::*;

#[derive(Default)]
pub struct HookChain {
    chains: HashMap<Hook, Vec<Arc<dyn HookHandler>>>,
}

impl HookRegistry for HookChain {
    fn prepend(&mut self, hook: Hook, handler: Arc<dyn HookHandler>) {
        self.chains.entry(hook).or_default().insert(0, handler);
    }
}

impl HookChain {
    pub async fn run(&self, hook: Hook, ctx: &Context, req: &mut Request) -> Flow {
        for handler in self.chains.get(&hook).into_iter().flatten() {
            if handler.call(ctx, req).await == Flow::Halt {
                return Flow::Halt;
            }
        }
        Flow::Continue
    }

    pub fn len(&self, hook: Hook) -> usize {
        self.chains.get(&hook).map_or(0, Vec::len)
    }
}

/// Handler that only counts how often the chain reached it.
#[derive(Default)]
pub struct Counter {
    pub hits: AtomicUsize,
}

#[async_trait]
impl HookHandler for Counter {
    async fn call(&self, _ctx: &Context, _req: &mut Request) -> Flow {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Flow::Continue
    }
}
