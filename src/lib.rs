//! # ipc-queue
//!
//! A bounded, named message queue backed by shared memory, for exchanging
//! discrete byte messages between unrelated processes on the same host.
//!
//! ## What it provides
//!
//! - **Named queues**: any process that knows the name can attach.
//! - **Fixed bounds**: the creating process fixes the message capacity and
//!   the per-message size limit for the queue's lifetime.
//! - **FIFO delivery** of whole messages, including zero-length ones.
//! - **Blocking and non-blocking** send/receive; a full queue on `try_send`
//!   or an empty queue on `try_receive` is an ordinary `false`/`None`
//!   outcome, never an error.
//! - **Cooperative shutdown**: `stop()` wakes every blocked sender and
//!   receiver in every attached process, `reset()` re-enables waiting.
//! - **Reference-counted lifetime**: the queue region is destroyed when the
//!   last handle anywhere closes.
//!
//! ## Architecture overview
//!
//! - `handle`: [`MessageQueue`], the move-only public handle
//! - `queue`: the ring-buffer engine coordinating state and waiters
//! - `region`: the named shared-memory backend and its layout
//! - `sync`: the process-shared mutex and wait/notify events
//! - `error`: the [`Error`] taxonomy
//! - `perms`: the [`Permissions`] pass-through descriptor
//!
//! The shared region holds a small header (parameters, ring indices, the
//! running flag and the attach count), the process-shared primitives and the
//! preallocated message slots. All of it is mutated only under the shared
//! mutex.
//!
//! ## Usage example
//!
//! ```rust,no_run
//! use ipc_queue::{MessageQueue, Permissions};
//!
//! // Process A
//! let mut producer = MessageQueue::new();
//! producer.open_or_create("sensor_frames", 64, 4096, Permissions::default())?;
//! producer.send(b"frame 1")?;
//!
//! // Process B
//! let mut consumer = MessageQueue::new();
//! consumer.open("sensor_frames")?;
//! let mut buf = vec![0u8; consumer.max_message_size() as usize];
//! while let Some(len) = consumer.receive(&mut buf)? {
//!     println!("frame: {:?}", &buf[..len]);
//! }
//! # Ok::<(), ipc_queue::Error>(())
//! ```
//!
//! Shutdown is cooperative: call `stop()` from any handle on the queue, join
//! the threads that might be blocked in `send`/`receive`, then drop the
//! handles.

/// Typed error taxonomy for attachment and queue operations.
pub mod error;

/// The move-only public queue handle.
pub mod handle;

/// Access-permission descriptor passed through to the backend at creation.
pub mod perms;

/// Command-line surface of the `ipc-queue` diagnostic binary.
pub mod cli;

/// Colorized log formatting for the binary.
pub mod logging;

mod queue;
mod region;
mod sync;

pub use error::{Error, Result};
pub use handle::MessageQueue;
pub use perms::Permissions;

/// The crate version, for diagnostics output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default parameters used by the `ipc-queue` binary.
pub mod defaults {
    /// Default maximum number of queued messages.
    ///
    /// Deep enough to absorb a burst from a producer while a consumer is
    /// scheduled out, small enough that an abandoned queue wastes little
    /// shared memory.
    pub const MAX_QUEUE_SIZE: u32 = 16;

    /// Default per-message size limit in bytes.
    pub const MAX_MESSAGE_SIZE: u32 = 1024;
}
