//! The public, move-only queue handle.

use std::fmt;

use crate::error::Result;
use crate::perms::Permissions;
use crate::queue::QueueInner;

/// A handle to a named, bounded, shared-memory message queue.
///
/// A handle starts out unattached; `create`, `open_or_create` or `open`
/// attach it to a queue region, `close` (or dropping the handle) detaches
/// it. The handle owns at most one attachment, cannot be cloned, and moving
/// it transfers the attachment. The queue region itself lives until the last
/// handle referencing it anywhere on the host is closed.
///
/// Runtime operations (`send`, `receive`, their `try_` variants, `clear`,
/// `stop`, `reset` and the accessors) take `&self` and may be called
/// concurrently from several threads of the owning process. Attachment
/// operations take `&mut self`, so they cannot overlap an in-flight
/// operation from safe code. The documented shutdown pattern is `stop()`,
/// join the threads that might be blocked, then drop or `close()` the
/// handle.
///
/// Calling a runtime operation on an unattached handle, or an attachment
/// operation on an attached one, is a programming error and panics.
///
/// # Example
///
/// ```no_run
/// use ipc_queue::{MessageQueue, Permissions};
///
/// let mut q = MessageQueue::new();
/// q.create("telemetry", 16, 1024, Permissions::default())?;
/// q.send(b"boot complete")?;
///
/// let mut buf = vec![0u8; q.max_message_size() as usize];
/// if let Some(len) = q.receive(&mut buf)? {
///     println!("got {} bytes", len);
/// }
/// # Ok::<(), ipc_queue::Error>(())
/// ```
pub struct MessageQueue {
    inner: Option<Box<QueueInner>>,
}

impl MessageQueue {
    /// A handle not attached to any queue.
    pub fn new() -> Self {
        Self { inner: None }
    }

    /// Creates the named queue and attaches to it.
    ///
    /// `max_queue_size` is the number of messages the queue can hold and
    /// `max_message_size` the per-message byte limit; both are fixed for the
    /// queue's whole lifetime. Fails with [`Error::AlreadyExists`] when a
    /// queue with this name exists.
    ///
    /// # Panics
    ///
    /// Panics if the handle is already attached.
    ///
    /// [`Error::AlreadyExists`]: crate::Error::AlreadyExists
    pub fn create(
        &mut self,
        name: &str,
        max_queue_size: u32,
        max_message_size: u32,
        perms: Permissions,
    ) -> Result<()> {
        self.ensure_unattached();
        self.inner = Some(QueueInner::create(
            name,
            max_queue_size,
            max_message_size,
            perms,
        )?);
        Ok(())
    }

    /// Attaches to the named queue, creating it first when absent.
    ///
    /// When the queue already exists its parameters win: the requested
    /// `max_queue_size` / `max_message_size` are ignored and the actual
    /// values can be read back through the accessors.
    ///
    /// # Panics
    ///
    /// Panics if the handle is already attached.
    pub fn open_or_create(
        &mut self,
        name: &str,
        max_queue_size: u32,
        max_message_size: u32,
        perms: Permissions,
    ) -> Result<()> {
        self.ensure_unattached();
        self.inner = Some(QueueInner::open_or_create(
            name,
            max_queue_size,
            max_message_size,
            perms,
        )?);
        Ok(())
    }

    /// Attaches to the existing named queue. Fails with
    /// [`Error::NotFound`] when there is none.
    ///
    /// # Panics
    ///
    /// Panics if the handle is already attached.
    ///
    /// [`Error::NotFound`]: crate::Error::NotFound
    pub fn open(&mut self, name: &str) -> Result<()> {
        self.ensure_unattached();
        self.inner = Some(QueueInner::open(name)?);
        Ok(())
    }

    /// Whether the handle is attached to a queue.
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// The queue's name.
    #[track_caller]
    pub fn name(&self) -> &str {
        self.engine().name()
    }

    /// Maximum number of messages the queue holds. May differ from the value
    /// passed to `open_or_create` when the queue already existed.
    #[track_caller]
    pub fn max_queue_size(&self) -> u32 {
        self.engine().max_queue_size()
    }

    /// Maximum size in bytes of a single message.
    #[track_caller]
    pub fn max_message_size(&self) -> u32 {
        self.engine().max_message_size()
    }

    /// Sends a message, blocking while the queue is full and running.
    ///
    /// Returns `Ok(true)` once the message is enqueued and `Ok(false)` when
    /// the call was interrupted by [`stop`](Self::stop) (or entered while
    /// the queue was full and stopped). Zero-length messages are valid.
    /// A message longer than [`max_message_size`](Self::max_message_size)
    /// fails with [`Error::MessageTooLarge`] without touching the queue.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not attached.
    ///
    /// [`Error::MessageTooLarge`]: crate::Error::MessageTooLarge
    #[track_caller]
    pub fn send(&self, message: &[u8]) -> Result<bool> {
        self.engine().send(message)
    }

    /// Like [`send`](Self::send) but never blocks; `Ok(false)` means the
    /// queue was full.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not attached.
    #[track_caller]
    pub fn try_send(&self, message: &[u8]) -> Result<bool> {
        self.engine().try_send(message)
    }

    /// Receives the oldest message into `buffer`, blocking while the queue
    /// is empty and running.
    ///
    /// Returns `Ok(Some(len))` with the message occupying `buffer[..len]`,
    /// or `Ok(None)` when the call was interrupted by [`stop`](Self::stop).
    /// `buffer` must be at least [`max_message_size`](Self::max_message_size)
    /// bytes, otherwise the call fails with [`Error::BufferTooSmall`]
    /// without consuming anything.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not attached.
    ///
    /// [`Error::BufferTooSmall`]: crate::Error::BufferTooSmall
    #[track_caller]
    pub fn receive(&self, buffer: &mut [u8]) -> Result<Option<usize>> {
        self.engine().receive(buffer)
    }

    /// Like [`receive`](Self::receive) but never blocks; `Ok(None)` means
    /// the queue was empty.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not attached.
    #[track_caller]
    pub fn try_receive(&self, buffer: &mut [u8]) -> Result<Option<usize>> {
        self.engine().try_receive(buffer)
    }

    /// Discards every queued message. Senders blocked on a full queue
    /// resume. Safe to call concurrently with any runtime operation.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not attached.
    #[track_caller]
    pub fn clear(&self) -> Result<()> {
        self.engine().clear()
    }

    /// Puts the queue into stopped state and wakes every blocked `send` and
    /// `receive`, which then return the interrupted outcome. Does not wait
    /// for them to actually return. Idempotent; affects every handle on the
    /// same queue, in every process, until [`reset`](Self::reset).
    ///
    /// # Panics
    ///
    /// Panics if the handle is not attached.
    #[track_caller]
    pub fn stop(&self) -> Result<()> {
        self.engine().stop()
    }

    /// Returns the queue to running state so blocking calls may wait again.
    /// Idempotent.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not attached.
    #[track_caller]
    pub fn reset(&self) -> Result<()> {
        self.engine().reset()
    }

    /// Detaches from the queue. A no-op on an unattached handle; never
    /// fails. The queue region is destroyed when this was the last handle
    /// referencing it across all processes. Also runs on drop.
    pub fn close(&mut self) {
        self.inner = None;
    }

    fn ensure_unattached(&self) {
        if self.inner.is_some() {
            panic!("message queue is already open");
        }
    }

    #[track_caller]
    fn engine(&self) -> &QueueInner {
        match &self.inner {
            Some(inner) => inner,
            None => panic!("message queue is not open"),
        }
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("MessageQueue")
                .field("name", &inner.name())
                .field("max_queue_size", &inner.max_queue_size())
                .field("max_message_size", &inner.max_message_size())
                .finish(),
            None => f.write_str("MessageQueue(closed)"),
        }
    }
}
