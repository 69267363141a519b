//! Cooperative cancellation (spec §5, §8 invariant 8)
//!
//! A deploy is cancellable at any time; cancellation must never leave a
//! half-signed event in flight, and no new blob jobs or publishes may start
//! once it fires. A single shared flag, checked at job/publish boundaries,
//! gives exactly that without unwinding through the orchestrator (spec §9's
//! redesign note against exceptions-as-control-flow).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
