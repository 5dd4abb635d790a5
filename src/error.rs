use shared_memory::ShmemError;
use std::io;
use thiserror::Error;

/// Errors reported by queue attachment and queue operations.
///
/// Transient conditions are deliberately absent from this enum: a full queue
/// on `try_send`, an empty queue on `try_receive` and an interruption by
/// `stop()` are ordinary outcomes, reported as `Ok(false)` / `Ok(None)` so
/// callers can retry or back off without error-driven control flow. Misuse of
/// an unattached handle is a panic, not an `Error` (see [`MessageQueue`]).
///
/// [`MessageQueue`]: crate::MessageQueue
#[derive(Error, Debug)]
pub enum Error {
    /// Create-only attachment found a queue with this name already present.
    #[error("message queue '{name}' already exists")]
    AlreadyExists { name: String },

    /// Open-only attachment found no queue with this name.
    #[error("message queue '{name}' does not exist")]
    NotFound { name: String },

    /// The queue name is not an identifier-like token.
    #[error("'{name}' is not a valid message queue name")]
    InvalidName { name: String },

    /// A message exceeds the fixed per-message limit of the queue.
    ///
    /// Unlike a full queue this is not transient: the same message can never
    /// be sent on this queue, so it is an error rather than a `false` result.
    #[error("message of {size} bytes exceeds the queue limit of {max_message_size} bytes")]
    MessageTooLarge { size: usize, max_message_size: u32 },

    /// A receive buffer is smaller than the queue's per-message limit.
    #[error("receive buffer of {size} bytes is below the required {min_buffer_size} bytes")]
    BufferTooSmall { size: usize, min_buffer_size: u32 },

    /// The named segment exists but does not hold a compatible queue, or its
    /// creator never finished initializing it.
    #[error("shared region has an invalid layout or magic")]
    Layout,

    /// The shared memory backend failed; carries the native cause.
    #[error("shared memory failure: {0}")]
    System(#[from] ShmemError),

    /// Filesystem-level failure while preparing the backing object.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A process-shared lock or event primitive failed.
    #[error("synchronization failure: {0}")]
    Sync(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Adapts the boxed, non-`Send` errors produced by the process-shared
    /// primitives into an owned variant.
    pub(crate) fn sync(err: Box<dyn std::error::Error>) -> Self {
        Error::Sync(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_queue() {
        let err = Error::AlreadyExists {
            name: "metrics".to_string(),
        };
        assert_eq!(err.to_string(), "message queue 'metrics' already exists");

        let err = Error::NotFound {
            name: "metrics".to_string(),
        };
        assert_eq!(err.to_string(), "message queue 'metrics' does not exist");
    }

    #[test]
    fn display_carries_both_sizes() {
        let err = Error::MessageTooLarge {
            size: 512,
            max_message_size: 64,
        };
        assert!(err.to_string().contains("512"));
        assert!(err.to_string().contains("64"));
    }

    #[test]
    fn sync_adapter_keeps_the_message() {
        let boxed: Box<dyn std::error::Error> = "wait failed".into();
        let err = Error::sync(boxed);
        assert!(matches!(err, Error::Sync(ref m) if m == "wait failed"));
    }
}
