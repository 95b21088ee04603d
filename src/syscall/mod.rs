//! System-call dispatch (component L, §4.L).
//!
//! A single trap vector (0x80) carries every call; the number comes in
//! a conventional register, arguments follow the same convention as a
//! regular function call. This module owns the dispatch table and the
//! pointer-validation helper; the actual trap-vector plumbing lives in
//! [`crate::arch::x86_64::idt`] (vector 0x80 is just another registered
//! handler).

use crate::error::Errno;
use crate::ipc;
use crate::task::tcb::TaskId;

#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallNumber {
    Exit = 0,
    Write = 1,
    GetPid = 2,
    Yield = 3,
    IpcSend = 4,
    IpcRecv = 5,
}

impl SyscallNumber {
    fn from_u64(n: u64) -> Option<Self> {
        Some(match n {
            0 => Self::Exit,
            1 => Self::Write,
            2 => Self::GetPid,
            3 => Self::Yield,
            4 => Self::IpcSend,
            5 => Self::IpcRecv,
            _ => return None,
        })
    }
}

/// The registers a syscall reads its arguments from and writes its
/// result to (conventional order: number, arg0, arg1, arg2; result
/// overwrites arg0's slot, matching the "return register" contract).
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallRegs {
    pub number: u64,
    pub arg0: u64,
    pub arg1: u64,
    pub arg2: u64,
}

const STDOUT_FD: u64 = 1;
const STDERR_FD: u64 = 2;

/// Validates that `[ptr, ptr+len)` lies in the caller's lower-half
/// (user-reachable) address range and is currently mapped (§4.L pointer
/// validation). The core does not yet track true per-address-space user
/// bounds beyond "lower half, page present", per the Non-goals on full
/// user-mode isolation.
fn validate_user_pointer(current_pml4: u64, ptr: u64, len: usize) -> Result<(), Errno> {
    if len == 0 {
        return Ok(());
    }
    let end = ptr.checked_add(len as u64).ok_or(Errno::Inval)?;
    const LOWER_HALF_LIMIT: u64 = 0x0000_8000_0000_0000;
    if ptr >= LOWER_HALF_LIMIT || end > LOWER_HALF_LIMIT {
        return Err(Errno::Fault);
    }
    // SAFETY: read-only probe of the current address space's page
    // tables; does not dereference `ptr` itself.
    let start_mapped = unsafe { crate::mm::vmm::translate(current_pml4, ptr & !0xFFF) } != 0;
    if !start_mapped {
        return Err(Errno::Fault);
    }
    Ok(())
}

/// Dispatches one syscall, reading arguments from and writing the
/// result back into `regs` (§4.L). `current_pml4` names the caller's
/// address space, used for pointer validation.
pub fn dispatch(regs: &mut SyscallRegs, current_pml4: u64) {
    let result = match SyscallNumber::from_u64(regs.number) {
        Some(SyscallNumber::Exit) => sys_exit(regs.arg0 as i32),
        Some(SyscallNumber::Write) => sys_write(regs.arg0, regs.arg1, regs.arg2 as usize, current_pml4),
        Some(SyscallNumber::GetPid) => sys_getpid(),
        Some(SyscallNumber::Yield) => sys_yield(),
        Some(SyscallNumber::IpcSend) => sys_ipc_send(regs.arg0, regs.arg1, current_pml4),
        Some(SyscallNumber::IpcRecv) => sys_ipc_recv(regs.arg0, regs.arg1, current_pml4),
        None => Err(Errno::NoSys),
    };

    regs.arg0 = match result {
        Ok(value) => value,
        Err(errno) => errno.as_retval() as u64,
    };
}

fn sys_exit(status: i32) -> Result<u64, Errno> {
    crate::task::scheduler::task_exit(status);
}

fn sys_write(fd: u64, buf_ptr: u64, len: usize, current_pml4: u64) -> Result<u64, Errno> {
    if fd != STDOUT_FD && fd != STDERR_FD {
        // The FD layer proper is excluded from this core (§1 scope);
        // anything other than the console fds is unsupported here.
        return Err(Errno::NoSys);
    }
    validate_user_pointer(current_pml4, buf_ptr, len)?;

    // SAFETY: `validate_user_pointer` confirmed the first page of this
    // range is present in the caller's address space; the kernel runs
    // with the same mappings visible (HHDM/shared upper half) for a
    // single-address-space-per-task model this core implements.
    let bytes = unsafe { core::slice::from_raw_parts(buf_ptr as *const u8, len) };
    if let Ok(s) = core::str::from_utf8(bytes) {
        crate::arch::x86_64::console::print(s);
    }
    Ok(len as u64)
}

fn sys_getpid() -> Result<u64, Errno> {
    Ok(crate::task::scheduler::current_task_id().0 as u64)
}

fn sys_yield() -> Result<u64, Errno> {
    crate::task::scheduler::task_yield();
    Ok(0)
}

fn sys_ipc_send(dest: u64, msg_ptr: u64, current_pml4: u64) -> Result<u64, Errno> {
    validate_user_pointer(current_pml4, msg_ptr, ipc::MAX_PAYLOAD)?;
    let sender = crate::task::scheduler::current_task_id();
    // SAFETY: validated above.
    let bytes = unsafe { core::slice::from_raw_parts(msg_ptr as *const u8, ipc::MAX_PAYLOAD) };
    ipc::send(sender, TaskId(dest as u32), 0, bytes)?;
    Ok(0)
}

fn sys_ipc_recv(sender_out: u64, msg_out: u64, current_pml4: u64) -> Result<u64, Errno> {
    validate_user_pointer(current_pml4, sender_out, core::mem::size_of::<u64>())?;
    validate_user_pointer(current_pml4, msg_out, ipc::MAX_PAYLOAD)?;

    let caller = crate::task::scheduler::current_task_id();
    let message = ipc::receive(caller);

    // SAFETY: both destinations validated above.
    unsafe {
        *(sender_out as *mut u64) = message.sender.0 as u64;
        let out = core::slice::from_raw_parts_mut(msg_out as *mut u8, ipc::MAX_PAYLOAD);
        out[..message.len].copy_from_slice(message.bytes());
    }
    Ok(message.len as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_syscall_number_yields_nosys() {
        assert!(SyscallNumber::from_u64(999).is_none());
    }

    #[test]
    fn known_numbers_round_trip() {
        assert_eq!(SyscallNumber::from_u64(0), Some(SyscallNumber::Exit));
        assert_eq!(SyscallNumber::from_u64(5), Some(SyscallNumber::IpcRecv));
    }

    #[test]
    fn pointer_past_lower_half_is_rejected() {
        let kernel_only_ptr = 0xFFFF_8000_0000_0000u64;
        let result = validate_user_pointer(0, kernel_only_ptr, 8);
        assert_eq!(result, Err(Errno::Fault));
    }

    #[test]
    fn zero_length_validation_always_succeeds() {
        assert_eq!(validate_user_pointer(0, 0x1000, 0), Ok(()));
    }
}
