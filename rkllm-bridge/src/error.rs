//! Error types for engine lifecycle and generation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Engine is already initialized in this process")]
    AlreadyInitialized,

    #[error("Failed to load runtime library: {0}")]
    LibraryLoad(String),

    #[error("Missing symbol in runtime library: {0}")]
    MissingSymbol(String),

    #[error("Engine init failed with code {0}")]
    InitFailed(i32),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Stream sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Engine rejected the run request with code {0}")]
    EngineRunFailure(i32),

    #[error("Generated output ({len} bytes) does not fit the declared capacity ({capacity} bytes)")]
    BufferTooSmall { len: usize, capacity: usize },

    #[error("Engine reported a runtime error during generation")]
    EngineRuntime,

    #[error("A generation is already in flight")]
    Busy,

    #[error("Engine abort failed with code {0}")]
    AbortFailed(i32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
