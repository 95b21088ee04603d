//! Task control block (component I, §3/§4.J).
//!
//! The spec models the task list as a doubly linked list of TCBs; per
//! §9's design note ("cyclic structures → arena + index"), this is
//! implemented as a flat slab of slots indexed by [`TaskId`] plus an
//! explicit insertion-ordered roster the scheduler scans, rather than
//! hand-rolled intrusive pointers.

use alloc::string::String;
use alloc::vec::Vec;

use crate::arch::x86_64::context::{self, Context};
use crate::ipc::Mailbox;

pub const MAX_NAME_LEN: usize = 31;
pub const DEFAULT_SLICE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
    Zombie,
}

/// A task's kernel-owned stack. Backed by a heap allocation (component
/// G sits below this) rather than a raw frame range: the task model
/// only needs a stable, exclusively-owned byte range to build contexts
/// in, and `Vec<u8>` already gives that without reinventing ownership.
pub struct Stack {
    storage: Vec<u8>,
}

impl Stack {
    pub fn new(size: usize) -> Self {
        Self { storage: alloc::vec![0u8; size] }
    }

    pub fn top(&mut self) -> *mut u8 {
        // SAFETY: `storage` is exclusively owned by this `Stack`.
        unsafe { self.storage.as_mut_ptr().add(self.storage.len()) }
    }

    pub fn size(&self) -> usize {
        self.storage.len()
    }
}

pub struct Tcb {
    pub id: TaskId,
    pub state: TaskState,
    pub context: Context,
    pub stack: Stack,
    pub name: String,
    pub time_slice: u32,
    pub total_ticks: u64,
    pub mailbox: Mailbox,
    pub blocked_on_receive: bool,
}

impl Tcb {
    /// Builds a fresh TCB whose first context switch "returns" into
    /// `entry(arg)` (§4.J task creation steps 2-5).
    pub fn new(id: TaskId, name: &str, stack_size: usize, entry: extern "C" fn(usize) -> !, arg: usize) -> Self {
        let mut stack = Stack::new(stack_size);
        let stack_top = stack.top();
        // SAFETY: `stack_top` points one-past-the-end of `stack`'s fresh,
        // exclusively-owned allocation, which is at least `MIN_STACK_FRAME`
        // given any reasonable `stack_size` (enforced by the caller, see
        // `scheduler::TASK_STACK_SIZE`).
        let context = unsafe { context::init_stack(stack_top, entry, arg) };

        let mut truncated = String::new();
        truncated.push_str(&name[..name.len().min(MAX_NAME_LEN)]);

        Self {
            id,
            state: TaskState::Ready,
            context,
            stack,
            name: truncated,
            time_slice: DEFAULT_SLICE,
            total_ticks: 0,
            mailbox: Mailbox::new(),
            blocked_on_receive: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry(_arg: usize) -> ! {
        loop {}
    }

    #[test]
    fn new_task_starts_ready_with_default_slice() {
        let tcb = Tcb::new(TaskId(1), "worker", 16 * 1024, dummy_entry, 0);
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.time_slice, DEFAULT_SLICE);
        assert_eq!(tcb.total_ticks, 0);
        assert!(!tcb.blocked_on_receive);
    }

    #[test]
    fn long_name_is_truncated() {
        let long_name = "a".repeat(100);
        let tcb = Tcb::new(TaskId(2), &long_name, 16 * 1024, dummy_entry, 0);
        assert_eq!(tcb.name.len(), MAX_NAME_LEN);
    }
}
