//! Kernel-wide error taxonomy (see spec §7).
//!
//! The core never panics from allocation failure alone; operations a caller
//! can reasonably handle return a [`KernelError`], while state-corrupting
//! conditions (unhandled faults, double huge-page insertion) go through
//! [`crate::panic`] instead.

/// Stable magnitudes returned to user space in the syscall return register.
/// Negative of these values is what the conventional ABI actually carries.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    /// Generic failure.
    Generic = 1,
    /// IPC destination task does not exist or is a zombie.
    DestMissing = 2,
    /// IPC destination mailbox is at capacity.
    MailboxFull = 3,
    /// Out of memory (PMM/VMM/heap exhaustion).
    NoMem = 4,
    /// A user pointer did not validate against the caller's address space.
    Fault = 5,
    /// Syscall number not recognized.
    NoSys = 6,
    /// Argument out of range / malformed.
    Inval = 7,
}

impl Errno {
    /// The value placed in the syscall return register: negative magnitude.
    pub const fn as_retval(self) -> isize {
        -(self as i32 as isize)
    }
}

/// Error kinds produced by the core subsystems. Distinct from [`Errno`]:
/// this is the internal, Rust-level error a subsystem returns to its
/// caller, which the syscall layer later maps onto an [`Errno`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// PMM, VMM, or heap allocation failed: no free frames / blocks.
    OutOfMemory,
    /// A user or kernel pointer failed validation.
    InvalidPointer,
    /// `kfree`/`free_frame` was called on memory already free.
    DoubleFree,
    /// IPC: destination task id does not name a live (non-zombie) task.
    DestMissing,
    /// IPC: destination mailbox is full.
    MailboxFull,
    /// Page table walk hit a huge-page leaf where a 4 KiB mapping was
    /// requested beneath it (§4.F, §9 — must error, never silently split).
    HugePageConflict,
    /// Argument failed a basic sanity check (alignment, zero length, ...).
    InvalidArgument,
}

impl From<KernelError> for Errno {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::OutOfMemory => Errno::NoMem,
            KernelError::InvalidPointer => Errno::Fault,
            KernelError::DoubleFree => Errno::Generic,
            KernelError::DestMissing => Errno::DestMissing,
            KernelError::MailboxFull => Errno::MailboxFull,
            KernelError::HugePageConflict => Errno::Inval,
            KernelError::InvalidArgument => Errno::Inval,
        }
    }
}

pub type KResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_retval_is_negative_magnitude() {
        assert_eq!(Errno::Generic.as_retval(), -1);
        assert_eq!(Errno::DestMissing.as_retval(), -2);
        assert_eq!(Errno::MailboxFull.as_retval(), -3);
    }

    #[test]
    fn kernel_error_maps_to_stable_errno() {
        assert_eq!(Errno::from(KernelError::DestMissing), Errno::DestMissing);
        assert_eq!(Errno::from(KernelError::MailboxFull), Errno::MailboxFull);
    }
}
