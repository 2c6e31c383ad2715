//! Live per-token stream sinks
//!
//! A sink is a real-time side channel for tokens as they arrive, distinct
//! from the accumulated final result. Two realizations of the same concept:
//! a pipe-like path opened for writing, or a caller-supplied callback.

use crate::error::{BridgeError, Result};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// End-of-stream marker delivered to the sink after the last token.
pub const EOS_MARKER: &str = "[[EOS]]";

/// Callback invoked once per token, then once with [`EOS_MARKER`].
pub type TokenCallback = Box<dyn FnMut(&str) + Send>;

/// Caller-facing description of where the live token stream should go.
pub enum SinkDescriptor {
    /// Filesystem path to an already-created named pipe (or any writable
    /// destination), opened for writing when the run starts.
    Pipe(PathBuf),

    /// Callback invoked on the engine's delivery thread.
    Callback(TokenCallback),
}

/// An open sink, owned by the generation session for one run.
pub(crate) enum StreamSink {
    Pipe(File),
    Callback(TokenCallback),
}

impl StreamSink {
    /// Resolve a descriptor into an open sink.
    ///
    /// Opening the pipe is the only fallible step and happens before the run
    /// is handed to the engine, so a bad destination fails the whole call
    /// with `SinkUnavailable` instead of losing tokens mid-stream.
    pub(crate) fn open(descriptor: SinkDescriptor) -> Result<Self> {
        match descriptor {
            SinkDescriptor::Pipe(path) => {
                let file = File::options().write(true).open(&path).map_err(|e| {
                    BridgeError::SinkUnavailable(format!("{}: {}", path.display(), e))
                })?;
                log::debug!("Opened stream sink at {}", path.display());
                Ok(StreamSink::Pipe(file))
            }
            SinkDescriptor::Callback(callback) => Ok(StreamSink::Callback(callback)),
        }
    }

    /// Forward one chunk of text (a token or the EOS marker).
    ///
    /// Pipe framing is one chunk per line, matching what stream readers
    /// expect. Write failures are logged and swallowed; sink delivery must
    /// never fail the generation itself.
    pub(crate) fn send(&mut self, text: &str) {
        match self {
            StreamSink::Pipe(file) => {
                if let Err(e) = writeln!(file, "{}", text) {
                    log::warn!("Stream sink write failed: {}", e);
                }
            }
            StreamSink::Callback(callback) => callback(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_callback_sink_receives_chunks() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let seen = received.clone();

        let descriptor = SinkDescriptor::Callback(Box::new(move |text| {
            seen.lock().unwrap().push(text.to_string());
        }));
        let mut sink = StreamSink::open(descriptor).unwrap();

        sink.send("hello");
        sink.send(" world");
        sink.send(EOS_MARKER);

        let chunks = received.lock().unwrap();
        assert_eq!(chunks.as_slice(), &["hello", " world", EOS_MARKER]);
    }

    #[test]
    fn test_pipe_sink_writes_one_chunk_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.out");
        std::fs::File::create(&path).unwrap();

        let mut sink = StreamSink::open(SinkDescriptor::Pipe(path.clone())).unwrap();
        sink.send("alpha");
        sink.send("beta");
        sink.send(EOS_MARKER);
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "alpha\nbeta\n[[EOS]]\n");
    }

    #[test]
    fn test_missing_pipe_is_sink_unavailable() {
        let result = StreamSink::open(SinkDescriptor::Pipe(PathBuf::from(
            "/nonexistent/path/to/fifo",
        )));
        assert!(matches!(result, Err(BridgeError::SinkUnavailable(_))));
    }
}
