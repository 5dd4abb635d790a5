//! Shared region backend.
//!
//! Owns everything platform-specific about the named segment: name
//! validation and mangling, segment creation/opening, the in-memory layout,
//! the initialization handshake and the unlink-on-last-close arming. The
//! queue engine above this module never sees an OS identifier.

use nix::errno::Errno;
use shared_memory::{Shmem, ShmemConf, ShmemError};
use std::mem;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::perms::Permissions;
use crate::sync;

/// Identifies a fully initialized queue region ("IPCQUEU1").
const MAGIC: u64 = 0x4950_4351_5545_5531;

/// Prefix composing the OS-level segment id from the logical queue name.
const OS_ID_PREFIX: &str = "imq_";

/// Alignment of the slot array; one cache line.
const SLOTS_ALIGN: usize = 64;

/// How long an opener waits for the creator to publish the magic before
/// declaring the segment bogus.
const HANDSHAKE_ATTEMPTS: u32 = 500;
const HANDSHAKE_DELAY: Duration = Duration::from_millis(1);

#[inline]
const fn align_up(x: usize, a: usize) -> usize {
    (x + a - 1) & !(a - 1)
}

/// Queue bookkeeping at offset zero of the shared region.
///
/// `capacity` and `slot_size` are written once by the creating process
/// before the magic is published and never change afterward. Every other
/// field is only mutated while the shared mutex is held; the atomics keep
/// the cross-process accesses well defined rather than providing lock-free
/// coordination.
#[repr(C)]
pub(crate) struct QueueHeader {
    pub magic: AtomicU64,
    pub capacity: u32,
    pub slot_size: u32,
    pub count: AtomicU32,
    pub head: AtomicU32,
    pub tail: AtomicU32,
    pub running: AtomicU32,
    pub attach_count: AtomicU32,
}

/// Byte offsets of every component inside the region.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RegionLayout {
    pub mutex_off: usize,
    pub not_full_off: usize,
    pub not_empty_off: usize,
    pub slots_off: usize,
    pub slot_stride: usize,
    pub total_size: usize,
}

impl RegionLayout {
    /// Layout for a queue of `capacity` slots of `slot_size` payload bytes.
    ///
    /// Each slot stores a `u32` length followed by the payload, padded so
    /// successive slots stay 8-aligned.
    pub(crate) fn compute(capacity: u32, slot_size: u32) -> Self {
        let mut off = align_up(mem::size_of::<QueueHeader>(), 8);
        let mutex_off = off;
        off += align_up(sync::mutex_size(), 8);
        let not_full_off = off;
        off += align_up(sync::event_size(), 8);
        let not_empty_off = off;
        off += align_up(sync::event_size(), 8);
        let slots_off = align_up(off, SLOTS_ALIGN);
        let slot_stride = align_up(4 + slot_size as usize, 8);
        let total_size = slots_off + capacity as usize * slot_stride;
        Self {
            mutex_off,
            not_full_off,
            not_empty_off,
            slots_off,
            slot_stride,
            total_size,
        }
    }
}

/// A mapped attachment to one named queue segment.
///
/// Dropping a `Region` unmaps it; the OS name is removed only when the
/// engine armed [`Region::arm_unlink`] first (last handle closing).
pub(crate) struct Region {
    shmem: Shmem,
    name: String,
}

impl Region {
    /// Creates the named segment, failing if it already exists.
    ///
    /// The returned region is still armed to unlink on drop, so an error in
    /// the caller's initialization sequence cleans the name up. Call
    /// [`Region::disarm_unlink`] once the region is fully initialized.
    pub(crate) fn create(
        name: &str,
        capacity: u32,
        slot_size: u32,
        perms: Permissions,
    ) -> Result<Self> {
        validate_name(name)?;
        let layout = RegionLayout::compute(capacity, slot_size);
        let os_id = os_id_for(name);
        let shmem = match ShmemConf::new()
            .size(layout.total_size)
            .os_id(&os_id)
            .create()
        {
            Ok(m) => m,
            Err(ShmemError::LinkExists) | Err(ShmemError::MappingIdExists) => {
                return Err(Error::AlreadyExists {
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(Error::System(e)),
        };
        debug!(
            "created region '{}' ({} bytes, capacity {}, slot size {})",
            os_id, layout.total_size, capacity, slot_size
        );
        apply_permissions(&os_id, perms)?;
        Ok(Self {
            shmem,
            name: name.to_string(),
        })
    }

    /// Opens an existing named segment and validates its handshake.
    pub(crate) fn open(name: &str) -> Result<Self> {
        validate_name(name)?;
        let os_id = os_id_for(name);
        let shmem = match ShmemConf::new().os_id(&os_id).open() {
            Ok(m) => m,
            Err(ShmemError::MapOpenFailed(code)) if Errno::from_raw(code as i32) == Errno::ENOENT => {
                return Err(Error::NotFound {
                    name: name.to_string(),
                })
            }
            Err(ShmemError::LinkDoesNotExist) => {
                return Err(Error::NotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(Error::System(e)),
        };
        if shmem.len() < mem::size_of::<QueueHeader>() {
            return Err(Error::Layout);
        }
        let mut region = Self {
            shmem,
            name: name.to_string(),
        };
        // Openers never own the name; only the last closer re-arms it.
        region.disarm_unlink();
        region.await_handshake()?;
        debug!("opened region '{}' ({} bytes)", os_id, region.shmem.len());
        Ok(region)
    }

    /// Waits for the creating process to publish the magic, then checks the
    /// mapping is large enough for the layout the header describes.
    fn await_handshake(&self) -> Result<()> {
        let header = unsafe { &*self.header() };
        let mut attempts = 0;
        while header.magic.load(Ordering::Acquire) != MAGIC {
            if attempts >= HANDSHAKE_ATTEMPTS {
                return Err(Error::Layout);
            }
            attempts += 1;
            thread::sleep(HANDSHAKE_DELAY);
        }
        let layout = RegionLayout::compute(header.capacity, header.slot_size);
        if self.shmem.len() < layout.total_size {
            return Err(Error::Layout);
        }
        Ok(())
    }

    /// Publishes the magic; other processes may attach from this point on.
    ///
    /// # Safety
    ///
    /// Must only be called by the creating process, after the header fields
    /// and the synchronization primitives are fully initialized.
    pub(crate) unsafe fn publish(&self) {
        (*self.header()).magic.store(MAGIC, Ordering::Release);
    }

    pub(crate) fn base(&self) -> *mut u8 {
        self.shmem.as_ptr()
    }

    pub(crate) fn header(&self) -> *mut QueueHeader {
        self.shmem.as_ptr() as *mut QueueHeader
    }

    /// The logical queue name, without any platform mangling.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Keep the OS name alive when this mapping goes away.
    pub(crate) fn disarm_unlink(&mut self) {
        self.shmem.set_owner(false);
    }

    /// Remove the OS name when this mapping goes away. Used by the creator's
    /// error paths and by the last handle to close.
    pub(crate) fn arm_unlink(&mut self) {
        self.shmem.set_owner(true);
    }
}

fn os_id_for(name: &str) -> String {
    format!("{OS_ID_PREFIX}{name}")
}

/// Queue names must be identifier-like tokens so they survive every
/// platform's kernel object naming rules after prefixing.
fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Applies the caller's permission bits to the freshly created backing
/// object. Creation-time only; attachments never touch permissions.
#[cfg(target_os = "linux")]
fn apply_permissions(os_id: &str, perms: Permissions) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let path = format!("/dev/shm/{os_id}");
    let mode = u32::from(perms.mode());
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn apply_permissions(_os_id: &str, _perms: Permissions) -> Result<()> {
    // The backing object keeps the platform default bits.
    Ok(())
}
