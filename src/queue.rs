//! Ring buffer state and the queue engine.
//!
//! One `QueueInner` is one process-local attachment to a shared queue
//! region. All queue state lives in the region; the engine holds the mapped
//! pointers, the process-shared primitives and the immutable parameters it
//! read at attach time. Every mutation of count/head/tail/running happens
//! inside a critical section of the shared mutex, including the message
//! byte copies (messages are slot-bounded, so the copy is O(slot size)).

use std::ptr;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::perms::Permissions;
use crate::region::{QueueHeader, Region, RegionLayout};
use crate::sync::QueueSync;

/// Attempts to resolve the create-vs-open race in `open_or_create` before
/// giving up and reporting the last failure.
const OPEN_OR_CREATE_ATTEMPTS: u32 = 16;

/// One attachment to a shared queue region.
///
/// Field order matters: the primitives in `sync` point into the mapping
/// owned by `region`, so they must drop first.
pub(crate) struct QueueInner {
    sync: QueueSync,
    region: Region,
    slots: *mut u8,
    slot_stride: usize,
    capacity: u32,
    slot_size: u32,
}

// The raw pointers all target the shared mapping, which outlives the struct
// and is only mutated under the process-shared mutex.
unsafe impl Send for QueueInner {}
unsafe impl Sync for QueueInner {}

impl QueueInner {
    /// Creates the named queue. Fails with [`Error::AlreadyExists`] when the
    /// name is taken.
    pub(crate) fn create(
        name: &str,
        capacity: u32,
        slot_size: u32,
        perms: Permissions,
    ) -> Result<Box<Self>> {
        let mut region = Region::create(name, capacity, slot_size, perms)?;
        let layout = RegionLayout::compute(capacity, slot_size);
        let base = region.base();
        // While the region is unpublished it is exclusively ours; an error
        // anywhere below drops `region` still armed, unlinking the name.
        let sync = unsafe {
            QueueSync::init_new(
                base.add(layout.mutex_off),
                base,
                base.add(layout.not_full_off),
                base.add(layout.not_empty_off),
            )
        }?;
        unsafe {
            let header = region.header();
            ptr::addr_of_mut!((*header).capacity).write(capacity);
            ptr::addr_of_mut!((*header).slot_size).write(slot_size);
            (*header).count.store(0, Ordering::Relaxed);
            (*header).head.store(0, Ordering::Relaxed);
            (*header).tail.store(0, Ordering::Relaxed);
            (*header).running.store(1, Ordering::Relaxed);
            (*header).attach_count.store(1, Ordering::Relaxed);
            region.publish();
        }
        region.disarm_unlink();
        debug!("queue '{}' created and published", name);
        Ok(Box::new(Self {
            sync,
            slots: unsafe { base.add(layout.slots_off) },
            slot_stride: layout.slot_stride,
            capacity,
            slot_size,
            region,
        }))
    }

    /// Attaches to the existing named queue. Fails with [`Error::NotFound`]
    /// when there is none.
    pub(crate) fn open(name: &str) -> Result<Box<Self>> {
        let region = Region::open(name)?;
        let header = unsafe { &*region.header() };
        // The region's parameters win over anything the caller asked for.
        let capacity = header.capacity;
        let slot_size = header.slot_size;
        let layout = RegionLayout::compute(capacity, slot_size);
        let base = region.base();
        let sync = unsafe {
            QueueSync::from_existing(
                base.add(layout.mutex_off),
                base,
                base.add(layout.not_full_off),
                base.add(layout.not_empty_off),
            )
        }?;
        {
            let _guard = sync.lock()?;
            header.attach_count.fetch_add(1, Ordering::AcqRel);
        }
        debug!(
            "queue '{}' opened (capacity {}, max message size {})",
            name, capacity, slot_size
        );
        Ok(Box::new(Self {
            sync,
            slots: unsafe { base.add(layout.slots_off) },
            slot_stride: layout.slot_stride,
            capacity,
            slot_size,
            region,
        }))
    }

    /// Attaches to the named queue, creating it when absent. An existing
    /// queue keeps its own parameters; the caller's are ignored.
    pub(crate) fn open_or_create(
        name: &str,
        capacity: u32,
        slot_size: u32,
        perms: Permissions,
    ) -> Result<Box<Self>> {
        let mut attempts = 0;
        loop {
            match Self::create(name, capacity, slot_size, perms) {
                Err(Error::AlreadyExists { .. }) => {}
                other => return other,
            }
            match Self::open(name) {
                // The segment vanished between the two calls; someone else
                // closed the last handle. Try creating again.
                Err(Error::NotFound { .. }) if attempts < OPEN_OR_CREATE_ATTEMPTS => {
                    attempts += 1;
                }
                other => return other,
            }
        }
    }

    fn header(&self) -> &QueueHeader {
        unsafe { &*self.region.header() }
    }

    pub(crate) fn name(&self) -> &str {
        self.region.name()
    }

    pub(crate) fn max_queue_size(&self) -> u32 {
        self.capacity
    }

    pub(crate) fn max_message_size(&self) -> u32 {
        self.slot_size
    }

    /// Blocking send. `Ok(false)` means the wait was interrupted by
    /// [`stop`](Self::stop).
    pub(crate) fn send(&self, message: &[u8]) -> Result<bool> {
        self.check_message_size(message.len())?;
        let header = self.header();
        let mut guard = self.sync.lock()?;
        while header.count.load(Ordering::Acquire) == self.capacity {
            if header.running.load(Ordering::Acquire) == 0 {
                return Ok(false);
            }
            guard = self.sync.wait_not_full(guard)?;
            // A stop-wake wins over a slot having been freed concurrently:
            // re-check the flag before trusting the space condition.
            if header.running.load(Ordering::Acquire) == 0 {
                return Ok(false);
            }
        }
        self.enqueue(header, message)?;
        drop(guard);
        Ok(true)
    }

    /// Non-blocking send. `Ok(false)` means the queue was full.
    pub(crate) fn try_send(&self, message: &[u8]) -> Result<bool> {
        self.check_message_size(message.len())?;
        let header = self.header();
        let _guard = self.sync.lock()?;
        if header.count.load(Ordering::Acquire) == self.capacity {
            return Ok(false);
        }
        self.enqueue(header, message)?;
        Ok(true)
    }

    /// Blocking receive into `buffer`. `Ok(None)` means the wait was
    /// interrupted by [`stop`](Self::stop).
    pub(crate) fn receive(&self, buffer: &mut [u8]) -> Result<Option<usize>> {
        self.check_buffer_size(buffer.len())?;
        let header = self.header();
        let mut guard = self.sync.lock()?;
        while header.count.load(Ordering::Acquire) == 0 {
            if header.running.load(Ordering::Acquire) == 0 {
                return Ok(None);
            }
            guard = self.sync.wait_not_empty(guard)?;
            if header.running.load(Ordering::Acquire) == 0 {
                return Ok(None);
            }
        }
        let len = self.dequeue(header, buffer)?;
        drop(guard);
        Ok(Some(len))
    }

    /// Non-blocking receive. `Ok(None)` means the queue was empty.
    pub(crate) fn try_receive(&self, buffer: &mut [u8]) -> Result<Option<usize>> {
        self.check_buffer_size(buffer.len())?;
        let header = self.header();
        let _guard = self.sync.lock()?;
        if header.count.load(Ordering::Acquire) == 0 {
            return Ok(None);
        }
        let len = self.dequeue(header, buffer)?;
        Ok(Some(len))
    }

    /// Empties the queue and frees every blocked sender. Parameters and the
    /// running flag are untouched.
    pub(crate) fn clear(&self) -> Result<()> {
        let header = self.header();
        let _guard = self.sync.lock()?;
        header.count.store(0, Ordering::Release);
        header.head.store(0, Ordering::Release);
        header.tail.store(0, Ordering::Release);
        self.sync.notify_not_full()?;
        Ok(())
    }

    /// Puts the queue in stopped state and wakes every blocked sender and
    /// receiver. Their calls return the interrupted outcome. Idempotent.
    pub(crate) fn stop(&self) -> Result<()> {
        let header = self.header();
        let _guard = self.sync.lock()?;
        header.running.store(0, Ordering::Release);
        self.sync.notify_not_full()?;
        self.sync.notify_not_empty()?;
        Ok(())
    }

    /// Returns the queue to running state; blocking calls may wait again.
    /// Idempotent.
    pub(crate) fn reset(&self) -> Result<()> {
        let header = self.header();
        let _guard = self.sync.lock()?;
        header.running.store(1, Ordering::Release);
        Ok(())
    }

    /// Detaches from the region, destroying it when this was the last
    /// attachment anywhere. Never fails; problems are logged and swallowed
    /// because this runs from destructors.
    fn release(&mut self) {
        let last = match self.sync.lock() {
            Ok(_guard) => self.header().attach_count.fetch_sub(1, Ordering::AcqRel) == 1,
            Err(err) => {
                warn!(
                    "detaching queue '{}' without the shared lock: {}",
                    self.region.name(),
                    err
                );
                false
            }
        };
        if last {
            debug!("last handle closed, destroying queue '{}'", self.region.name());
            self.region.arm_unlink();
        }
    }

    fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.slot_size as usize {
            return Err(Error::MessageTooLarge {
                size,
                max_message_size: self.slot_size,
            });
        }
        Ok(())
    }

    fn check_buffer_size(&self, size: usize) -> Result<()> {
        if size < self.slot_size as usize {
            return Err(Error::BufferTooSmall {
                size,
                min_buffer_size: self.slot_size,
            });
        }
        Ok(())
    }

    /// Writes `message` into the tail slot and publishes it. Lock held.
    fn enqueue(&self, header: &QueueHeader, message: &[u8]) -> Result<()> {
        let tail = header.tail.load(Ordering::Acquire);
        unsafe {
            let slot = self.slots.add(tail as usize * self.slot_stride);
            (slot as *mut u32).write(message.len() as u32);
            if !message.is_empty() {
                ptr::copy_nonoverlapping(message.as_ptr(), slot.add(4), message.len());
            }
        }
        header.tail.store((tail + 1) % self.capacity, Ordering::Release);
        header.count.fetch_add(1, Ordering::AcqRel);
        self.sync.notify_not_empty()
    }

    /// Copies the head slot out into `buffer` and retires it. Lock held.
    fn dequeue(&self, header: &QueueHeader, buffer: &mut [u8]) -> Result<usize> {
        let head = header.head.load(Ordering::Acquire);
        let len = unsafe {
            let slot = self.slots.add(head as usize * self.slot_stride);
            let len = (slot as *const u32).read() as usize;
            debug_assert!(len <= self.slot_size as usize);
            if len > 0 {
                ptr::copy_nonoverlapping(slot.add(4), buffer.as_mut_ptr(), len);
            }
            len
        };
        header.head.store((head + 1) % self.capacity, Ordering::Release);
        header.count.fetch_sub(1, Ordering::AcqRel);
        self.sync.notify_not_full()?;
        Ok(len)
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        self.release();
    }
}
