//! rkllm-bridge - blocking generation over the asynchronous RKLLM runtime
//!
//! This crate wraps the callback-driven librkllmrt C API in a synchronous
//! adapter: one blocking `generate` call per request, with an optional live
//! token stream, single-flight enforcement, and out-of-band cancellation.

pub mod bridge;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod native;
pub mod params;
pub mod session;
pub mod sink;

pub use bridge::RkllmBridge;
pub use engine::{EngineBackend, GenerationInput};
pub use error::{BridgeError, Result};
pub use native::{default_runtime_library, NativeEngine};
pub use params::GenerationParams;
pub use session::GenerationSession;
pub use sink::{SinkDescriptor, TokenCallback, EOS_MARKER};
