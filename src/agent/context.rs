use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::event::Event;

/// Callback a runner uses to stream events outward.
pub type Emit = Arc<dyn Fn(Event) + Send + Sync>;

/// Ambient per-request state, threaded explicitly through the runner and
/// into every tool execution. Tools read the current session and delegation
/// depth from here; no global state.
#[derive(Clone)]
pub struct RunContext {
    pub session_id: String,
    /// 0 for a top-level run; each delegation hop increments by one.
    pub delegation_depth: u32,
    emit: Emit,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(session_id: impl Into<String>, emit: Emit, cancel: CancellationToken) -> Self {
        Self {
            session_id: session_id.into(),
            delegation_depth: 0,
            emit,
            cancel,
        }
    }

    /// Derive the context for a sub-agent run: new session, new emit sink,
    /// depth + 1. Cancellation is inherited so a dropped request also stops
    /// its delegates.
    pub fn child(&self, session_id: impl Into<String>, emit: Emit) -> Self {
        Self {
            session_id: session_id.into(),
            delegation_depth: self.delegation_depth + 1,
            emit,
            cancel: self.cancel.clone(),
        }
    }

    pub fn emit(&self, event: Event) {
        (self.emit)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_child_increments_depth_and_swaps_emit() {
        let outer: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
        let outer_sink = outer.clone();
        let ctx = RunContext::new(
            "parent",
            Arc::new(move |e| outer_sink.lock().unwrap().push(e)),
            CancellationToken::new(),
        );
        assert_eq!(ctx.delegation_depth, 0);

        let inner: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
        let inner_sink = inner.clone();
        let child = ctx.child(
            "parent:delegate:researcher",
            Arc::new(move |e| inner_sink.lock().unwrap().push(e)),
        );
        assert_eq!(child.delegation_depth, 1);
        assert_eq!(child.session_id, "parent:delegate:researcher");

        child.emit(Event::Done);
        assert!(outer.lock().unwrap().is_empty());
        assert_eq!(inner.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_cancellation_is_inherited() {
        let ctx = RunContext::new("s", Arc::new(|_| {}), CancellationToken::new());
        let child = ctx.child("s:delegate:x", Arc::new(|_| {}));
        ctx.cancel.cancel();
        assert!(child.cancel.is_cancelled());
    }
}
