//! Synchronous bridge over the asynchronous engine
//!
//! [`RkllmBridge`] is the only externally callable generation entry point:
//! it creates a per-run session, hands it to the engine, blocks the calling
//! thread until the session's completion signal fires, then harvests the
//! accumulated text. Exactly one generation is in flight at a time; a second
//! caller gets an explicit `Busy` error instead of corrupted shared state.

use crate::engine::{EngineBackend, GenerationInput};
use crate::error::{BridgeError, Result};
use crate::native::NativeEngine;
use crate::params::GenerationParams;
use crate::session::GenerationSession;
use crate::sink::{SinkDescriptor, StreamSink};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Owned handle to one initialized engine instance.
///
/// Shareable across threads: `generate` blocks the calling thread while
/// `abort` and `is_running` may be issued out-of-band from another one.
/// Dropping the bridge tears the engine down.
///
/// # Example
/// ```no_run
/// use rkllm_bridge::{GenerationInput, GenerationParams, RkllmBridge};
/// use std::path::Path;
///
/// let params = GenerationParams {
///     max_new_tokens: 256,
///     ..Default::default()
/// };
/// let bridge = RkllmBridge::init(
///     Path::new("librkllmrt.so"),
///     Path::new("models/qwen-1.8b.rkllm"),
///     &params,
/// )?;
/// let text = bridge.generate(GenerationInput::Prompt("Hello".into()), None, None)?;
/// println!("{}", text);
/// # Ok::<(), rkllm_bridge::BridgeError>(())
/// ```
pub struct RkllmBridge {
    engine: Mutex<Option<Box<dyn EngineBackend>>>,
    active: Mutex<Option<Arc<GenerationSession>>>,
}

impl RkllmBridge {
    /// Load librkllmrt and initialize the engine with the given model.
    ///
    /// Fails with `AlreadyInitialized` if a native engine is already live in
    /// this process; the runtime supports one instance at a time.
    pub fn init(library_path: &Path, model_path: &Path, params: &GenerationParams) -> Result<Self> {
        let engine = NativeEngine::load(library_path, model_path, params)?;
        Ok(Self::with_backend(Box::new(engine)))
    }

    /// Build a bridge over an arbitrary engine backend.
    pub fn with_backend(backend: Box<dyn EngineBackend>) -> Self {
        Self {
            engine: Mutex::new(Some(backend)),
            active: Mutex::new(None),
        }
    }

    /// Run one generation to completion and return the full generated text.
    ///
    /// Blocks until the engine delivers its terminal event (or `abort` is
    /// called from another thread; the text harvested after an abort may be
    /// partial). Tokens are appended to the result in delivery order and
    /// mirrored to `sink`, if given, as they arrive.
    ///
    /// # Arguments
    /// * `input` - Prompt text or a pre-tokenized sequence
    /// * `output_capacity` - Compatibility limit for fixed-size callers:
    ///   when `Some(cap)` and the accumulated output is `cap` bytes or more,
    ///   the call fails with `BufferTooSmall` and surrenders nothing
    /// * `sink` - Optional live per-token stream destination
    pub fn generate(
        &self,
        input: GenerationInput,
        output_capacity: Option<usize>,
        sink: Option<SinkDescriptor>,
    ) -> Result<String> {
        if self
            .engine
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
        {
            return Err(BridgeError::NotInitialized);
        }
        if let GenerationInput::Tokens(tokens) = &input {
            if tokens.is_empty() {
                return Err(BridgeError::InvalidInput(
                    "Token sequence is empty".to_string(),
                ));
            }
        }

        // Open the sink before registering the run, so a bad destination
        // fails without leaving any shared state behind.
        let stream_sink = sink.map(StreamSink::open).transpose()?;
        let session = Arc::new(GenerationSession::new(stream_sink));

        // Registration and start form one critical section under the engine
        // lock; abort takes the same lock, so its wake can only ever hit a
        // session the engine has actually seen.
        let started = {
            let mut engine = self.engine.lock().unwrap_or_else(|e| e.into_inner());
            match engine.as_mut() {
                Some(backend) => {
                    {
                        let mut active =
                            self.active.lock().unwrap_or_else(|e| e.into_inner());
                        if active.is_some() {
                            return Err(BridgeError::Busy);
                        }
                        *active = Some(Arc::clone(&session));
                    }
                    backend.start(&input, &session)
                }
                None => Err(BridgeError::NotInitialized),
            }
        };
        if let Err(e) = started {
            // A failed ack means no callback will ever fire; waiting would
            // hang forever.
            self.finish_run(&session);
            return Err(e);
        }

        // The only blocking point of the adapter. No timeout: abort is the
        // one way to unblock it early.
        session.wait();

        self.finish_run(&session);

        if session.failed() {
            return Err(BridgeError::EngineRuntime);
        }

        let output = session.take_output();
        if let Some(capacity) = output_capacity {
            if output.len() >= capacity {
                return Err(BridgeError::BufferTooSmall {
                    len: output.len(),
                    capacity,
                });
            }
        }
        Ok(output)
    }

    /// Request cancellation of the in-flight generation.
    ///
    /// Asks the engine to stop, then unconditionally wakes the blocked
    /// `generate` call even if the engine never delivers a terminal event.
    /// Calling this with no generation running is a safe no-op.
    pub fn abort(&self) -> Result<()> {
        // Held across both steps: generate registers-and-starts under this
        // same lock, so abort either sees no run at all (the engine abort is
        // an idle no-op and nothing is woken) or a run the engine has
        // already been handed.
        let mut engine = self.engine.lock().unwrap_or_else(|e| e.into_inner());
        let result = match engine.as_mut() {
            Some(backend) => backend.abort(),
            None => Err(BridgeError::NotInitialized),
        };

        // Wake the waiter regardless of what the engine said; a hung caller
        // is worse than a partial result.
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = active.as_ref() {
            session.force_finish();
        }

        result
    }

    /// Whether the engine currently has a generation task active.
    pub fn is_running(&self) -> Result<bool> {
        let mut engine = self.engine.lock().unwrap_or_else(|e| e.into_inner());
        match engine.as_mut() {
            Some(backend) => backend.is_running(),
            None => Err(BridgeError::NotInitialized),
        }
    }

    /// Tear the engine down. Idempotent; later calls are no-ops and later
    /// generations fail with `NotInitialized`.
    pub fn shutdown(&self) {
        let backend = self.engine.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut backend) = backend {
            backend.shutdown();
        }
    }

    /// Close the sink and deregister the run, on every exit path.
    fn finish_run(&self, session: &Arc<GenerationSession>) {
        session.close_sink();
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = active.as_ref() {
            if Arc::ptr_eq(current, session) {
                *active = None;
            }
        }
    }
}

impl Drop for RkllmBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
