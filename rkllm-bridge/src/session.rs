//! Per-run generation session and callback dispatch
//!
//! A session owns everything one run mutates: the accumulated output, the
//! stream sink, and the completion signal. The bridge creates it, the
//! engine's delivery thread mutates it through the dispatch methods, and the
//! bridge harvests it after the terminal event. Sharing is via `Arc`, so a
//! late callback can never touch a freed session.

use crate::sink::{StreamSink, EOS_MARKER};
use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
struct RunState {
    finished: bool,
    failed: bool,
}

/// Mutable state for exactly one generation run.
///
/// One writer (the engine's delivery thread) and one reader (the bridge,
/// only after the completion signal fires), so the output mutex is only
/// contended for the brief append.
pub struct GenerationSession {
    output: Mutex<String>,
    sink: Mutex<Option<StreamSink>>,
    state: Mutex<RunState>,
    completed: Condvar,
}

impl GenerationSession {
    pub(crate) fn new(sink: Option<StreamSink>) -> Self {
        Self {
            output: Mutex::new(String::new()),
            sink: Mutex::new(sink),
            state: Mutex::new(RunState::default()),
            completed: Condvar::new(),
        }
    }

    /// Non-terminal delivery: append to the accumulated output, then forward
    /// to the sink. Sink I/O happens after the output lock is released.
    pub fn on_token(&self, text: &str) {
        {
            let mut output = self.output.lock().unwrap_or_else(|e| e.into_inner());
            output.push_str(text);
        }
        self.forward(text);
    }

    /// Terminal delivery: generation finished normally.
    pub fn on_finish(&self) {
        self.forward(EOS_MARKER);
        self.complete(false);
    }

    /// Terminal delivery: the engine reported a runtime error.
    pub fn on_error(&self) {
        log::error!("Engine reported a runtime error during generation");
        self.complete(true);
    }

    /// Abort path: unblock the waiter even though the engine may never
    /// deliver its own terminal event.
    pub(crate) fn force_finish(&self) {
        self.complete(false);
    }

    /// Block until a terminal event (or a forced finish) has been recorded.
    pub(crate) fn wait(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while !state.finished {
            state = self
                .completed
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Whether the terminal event was an engine error.
    pub(crate) fn failed(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).failed
    }

    /// Move the accumulated output out of the session.
    ///
    /// Only meaningful after `wait` returns; the happens-before edge from the
    /// completion signal makes the text immutable by then.
    pub(crate) fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Drop the sink, closing a pipe destination if one was opened.
    pub(crate) fn close_sink(&self) {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn forward(&self, text: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sink) = sink.as_mut() {
            sink.send(text);
        }
    }

    fn complete(&self, failed: bool) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.finished = true;
            state.failed = state.failed || failed;
        }
        self.completed.notify_one();
    }
}
