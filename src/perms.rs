use nix::sys::stat::Mode;

/// Access permissions for the backing shared memory object.
///
/// This is an opaque pass-through descriptor: the queue engine never
/// interprets it, the region backend applies it once at creation time.
/// Attachments to an existing queue ignore it entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    mode: Mode,
}

impl Permissions {
    /// Permissions from raw `mode_t` bits, e.g. `0o640`.
    ///
    /// Bits outside the permission mask are dropped.
    pub fn from_mode(mode: libc::mode_t) -> Self {
        Self {
            mode: Mode::from_bits_truncate(mode),
        }
    }

    /// The raw permission bits.
    pub fn mode(&self) -> libc::mode_t {
        self.mode.bits()
    }
}

impl Default for Permissions {
    /// Owner read/write only, the same default the platform message queue
    /// APIs use.
    fn default() -> Self {
        Self {
            mode: Mode::S_IRUSR | Mode::S_IWUSR,
        }
    }
}
