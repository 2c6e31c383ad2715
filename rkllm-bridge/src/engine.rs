//! The seam between the bridge and an engine implementation
//!
//! The bridge only ever talks to an engine through [`EngineBackend`]. The
//! production implementation is [`crate::native::NativeEngine`]; tests and
//! alternate engine builds plug in their own.

use crate::error::Result;
use crate::session::GenerationSession;
use std::sync::Arc;

/// Input payload for one generation run: a text prompt or a pre-tokenized
/// sequence, never both.
#[derive(Debug, Clone)]
pub enum GenerationInput {
    Prompt(String),
    Tokens(Vec<i32>),
}

/// An inference engine viewed through the adapter's contract.
///
/// `start` must return immediately with the engine's ack. After an `Ok` ack
/// the engine delivers zero or more non-terminal events followed by exactly
/// one terminal event to the session, on a thread the engine owns. An `Err`
/// ack means no event will ever be delivered for this run.
pub trait EngineBackend: Send {
    /// Kick off an asynchronous generation feeding `session`.
    fn start(&mut self, input: &GenerationInput, session: &Arc<GenerationSession>) -> Result<()>;

    /// Ask the engine to stop the in-flight generation. Returns once the
    /// engine has acknowledged the request.
    fn abort(&mut self) -> Result<()>;

    /// Whether a generation task is currently active inside the engine.
    fn is_running(&mut self) -> Result<bool>;

    /// Tear the engine down. Must tolerate being called more than once.
    fn shutdown(&mut self);
}
