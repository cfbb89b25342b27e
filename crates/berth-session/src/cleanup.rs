//! LIFO stack of deferred async cleanup actions.
use std::future::Future;

use futures::{FutureExt, future::BoxFuture};
use tracing::{debug, warn};

use crate::SessionError;

type Deferred<C> = Box<dyn FnOnce(C) -> BoxFuture<'static, Result<(), SessionError>> + Send>;

/// Cleanup actions registered while a session is being set up.
///
/// Actions run in reverse registration order. Each receives a copy of the completion context
/// `C`; a failing action is logged and the remaining ones still run.
pub struct DeferStack<C> {
    actions: Vec<(&'static str, Deferred<C>)>,
}

impl<C: Clone + Send + 'static> DeferStack<C> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Register an action under a short label used in logs.
    pub fn push<F, Fut>(&mut self, label: &'static str, action: F)
    where
        F: FnOnce(C) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), SessionError>> + Send + 'static,
    {
        let deferred: Deferred<C> = Box::new(move |ctx| action(ctx).boxed());
        self.actions.push((label, deferred));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every registered action, newest first. Returns the number of failed actions.
    pub async fn unwind(&mut self, ctx: C) -> usize {
        let mut failed = 0;
        while let Some((label, action)) = self.actions.pop() {
            match action(ctx.clone()).await {
                Ok(()) => debug!(cleanup = label, "deferred cleanup done"),
                Err(e) => {
                    failed += 1;
                    warn!(cleanup = label, error = %e, "deferred cleanup failed");
                }
            }
        }
        failed
    }
}

impl<C: Clone + Send + 'static> Default for DeferStack<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Drop for DeferStack<C> {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            warn!(
                pending = self.actions.len(),
                "cleanup stack dropped before unwinding"
            );
        }
    }
}
