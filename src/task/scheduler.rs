//! Round-robin scheduler (component J, §4.J).
//!
//! **Design-note decision (§9 open question on preemption soundness):**
//! this scheduler performs the context switch synchronously inside
//! `sched_tick`, i.e. directly from the timer IRQ handler, rather than
//! deferring it to a later cooperative safe point or fabricating an
//! `iretq` frame per switch. That is sound here only because of two
//! properties this kernel holds together: every task owns a private
//! stack (`Tcb::stack`, never shared across tasks), and the timer vector
//! carries no IST redirect, so the timer ISR always runs on whatever
//! stack the interrupted task was already using. `switch_to` therefore
//! never competes with another task's pending interrupt frame on the
//! same memory: when a task is switched out mid-ISR, the `x86-interrupt`
//! trampoline's saved registers and `iretq` frame stay parked, untouched,
//! on that task's own stack until it is switched back in, at which point
//! `switch_to`'s `ret` unwinds back up through `schedule`/`sched_tick`/
//! the IRQ trampoline exactly as it would from an ordinary call, reaching
//! that task's own `iretq` normally. The scheme the spec calls out as
//! unsound in general is the same technique over a *shared* kernel
//! interrupt stack (e.g. a single `TSS.rsp0` used by every task) — there,
//! a second task's interrupt frame would land on top of the first task's
//! still-parked one. See `DESIGN.md` for the fuller writeup.

use alloc::vec::Vec;

use spin::Mutex;

use super::tcb::{TaskId, TaskState, Tcb, DEFAULT_SLICE};
use crate::arch::x86_64::context;

/// Timer tick rate driving `sched_tick` (§6 external interface).
pub const TICK_HZ: u32 = 100;
pub const TASK_STACK_SIZE: usize = 32 * 1024;
const MAX_TASKS: usize = 64;

struct Scheduler {
    /// Slab of task slots, indexed by `TaskId`.
    tasks: Vec<Option<Tcb>>,
    /// Insertion-ordered roster; this stands in for the spec's circular
    /// doubly linked task list (see `tcb` module docs).
    roster: Vec<TaskId>,
    current_index: usize,
    idle_id: Option<TaskId>,
    next_id: u32,
}

impl Scheduler {
    const fn empty() -> Self {
        Self { tasks: Vec::new(), roster: Vec::new(), current_index: 0, idle_id: None, next_id: 0 }
    }

    fn alloc_id(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        id
    }

    fn get_mut(&mut self, id: TaskId) -> Option<&mut Tcb> {
        self.tasks.iter_mut().flatten().find(|t| t.id == id)
    }

    fn get(&self, id: TaskId) -> Option<&Tcb> {
        self.tasks.iter().flatten().find(|t| t.id == id)
    }

    fn current_id(&self) -> TaskId {
        self.roster[self.current_index]
    }

    fn create(&mut self, name: &str, entry: extern "C" fn(usize) -> !, arg: usize) -> Option<TaskId> {
        if self.roster.len() >= MAX_TASKS {
            return None;
        }
        let id = self.alloc_id();
        let tcb = Tcb::new(id, name, TASK_STACK_SIZE, entry, arg);
        self.tasks.push(Some(tcb));
        self.roster.push(id);
        Some(id)
    }

    /// Picks the next Ready task starting the scan at `current.next`,
    /// per §4.J. The idle task is always a valid fallback.
    fn pick_next(&self) -> usize {
        let n = self.roster.len();
        for offset in 1..=n {
            let index = (self.current_index + offset) % n;
            let id = self.roster[index];
            if let Some(task) = self.get(id) {
                if task.state == TaskState::Ready {
                    return index;
                }
            }
        }
        // Fall back to idle, wherever it sits in the roster.
        let idle_id = self.idle_id.expect("idle task must exist before scheduling");
        self.roster.iter().position(|&id| id == idle_id).unwrap_or(self.current_index)
    }
}

static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::empty());

extern "C" fn idle_loop(_arg: usize) -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

/// Creates the idle task. Must be called once, before the first
/// `schedule()`/`sched_tick()`.
pub fn init() {
    let mut scheduler = SCHEDULER.lock();
    let id = scheduler.create("idle", idle_loop, 0).expect("idle task is the first task created");
    scheduler.idle_id = Some(id);
    scheduler.current_index = scheduler.roster.iter().position(|&r| r == id).unwrap();
    if let Some(idle) = scheduler.get_mut(id) {
        idle.state = TaskState::Running;
    }
}

/// Creates a new task (§4.J `task_create`). Returns `None` if the task
/// table is full (this core's rollback story for allocation failure:
/// nothing was partially constructed since `Tcb::new` is infallible
/// once space in the table is confirmed).
pub fn task_create(name: &str, entry: extern "C" fn(usize) -> !, arg: usize) -> Option<TaskId> {
    SCHEDULER.lock().create(name, entry, arg)
}

pub fn current_task_id() -> TaskId {
    SCHEDULER.lock().current_id()
}

/// Performs one round-robin rotation. No-op (beyond refreshing the
/// slice) if the chosen task is already current.
pub fn schedule() {
    let mut scheduler = SCHEDULER.lock();
    let next_index = scheduler.pick_next();

    if next_index == scheduler.current_index {
        if let Some(task) = scheduler.get_mut(scheduler.current_id()) {
            task.time_slice = DEFAULT_SLICE;
        }
        return;
    }

    let current_id = scheduler.current_id();
    let next_id = scheduler.roster[next_index];

    if let Some(current) = scheduler.get_mut(current_id) {
        if current.state == TaskState::Running {
            current.state = TaskState::Ready;
        }
    }

    let next_context_ptr;
    let current_context_ptr;
    {
        let next = scheduler.get_mut(next_id).expect("roster entry must exist");
        next.state = TaskState::Running;
        next.time_slice = DEFAULT_SLICE;
        next_context_ptr = &mut next.context as *mut context::Context;
    }
    {
        let current = scheduler.get_mut(current_id).expect("roster entry must exist");
        current_context_ptr = &mut current.context as *mut context::Context;
    }
    scheduler.current_index = next_index;

    // Drop the lock before the stack swap: `switch_to` does not return
    // until this task is switched back in, and the lock must not stay
    // held across that span.
    drop(scheduler);

    // SAFETY: both contexts belong to live TCBs in the scheduler's slab,
    // which outlives this call (the slab only shrinks via the reaper,
    // which never reaps the running task).
    unsafe { context::switch_to(current_context_ptr, next_context_ptr) };
}

/// Called from the timer IRQ handler with interrupts disabled (§4.J
/// `sched_tick`). See the module doc comment for why a direct switch
/// here is sound in this design.
pub fn sched_tick() {
    let should_switch = {
        let mut scheduler = SCHEDULER.lock();
        let current_id = scheduler.current_id();
        let task = scheduler.get_mut(current_id).expect("current task must exist");
        task.total_ticks += 1;
        if task.time_slice > 0 {
            task.time_slice -= 1;
        }
        task.time_slice == 0
    };
    if should_switch {
        schedule();
    }
}

/// Voluntary yield (§4.J, §5 suspension points).
pub fn task_yield() {
    schedule();
}

/// Transitions the current task to Zombie and switches away. Never
/// returns (§4.J `task_exit`).
pub fn task_exit(_status: i32) -> ! {
    {
        let mut scheduler = SCHEDULER.lock();
        let id = scheduler.current_id();
        if let Some(task) = scheduler.get_mut(id) {
            task.state = TaskState::Zombie;
        }
    }
    schedule();
    unreachable!("a Zombie task is never rescheduled");
}

/// Reaps at most one Zombie task's resources, skipping the currently
/// running task (§4.J reaper step). Returns whether anything was reaped.
pub fn reap_one() -> bool {
    let mut scheduler = SCHEDULER.lock();
    let current = scheduler.current_id();
    let victim = scheduler
        .roster
        .iter()
        .copied()
        .find(|&id| id != current && scheduler.get(id).map(|t| t.state == TaskState::Zombie).unwrap_or(false));

    let Some(victim) = victim else { return false };
    scheduler.roster.retain(|&id| id != victim);
    if let Some(slot) = scheduler.tasks.iter_mut().find(|t| t.as_ref().map(|t| t.id) == Some(victim)) {
        *slot = None; // drops the Tcb, freeing its Stack/mailbox
    }
    // `current_index` names a position in `roster`; removing an earlier
    // entry would shift it, so recompute from the still-current id.
    scheduler.current_index = scheduler.roster.iter().position(|&id| id == current).unwrap_or(0);
    true
}

/// Returns the current task's accumulated tick count, used by tests and
/// by fairness diagnostics.
pub fn total_ticks(id: TaskId) -> Option<u64> {
    SCHEDULER.lock().get(id).map(|t| t.total_ticks)
}

pub fn task_state(id: TaskId) -> Option<TaskState> {
    SCHEDULER.lock().get(id).map(|t| t.state)
}

pub fn set_blocked_on_receive(id: TaskId, blocked: bool) {
    let mut scheduler = SCHEDULER.lock();
    if let Some(task) = scheduler.get_mut(id) {
        task.blocked_on_receive = blocked;
        task.state = if blocked { TaskState::Blocked } else { TaskState::Ready };
    }
}

pub fn is_blocked_on_receive(id: TaskId) -> bool {
    SCHEDULER.lock().get(id).map(|t| t.blocked_on_receive).unwrap_or(false)
}

/// Wakes a task blocked on receive, transitioning it back to Ready so
/// the next `schedule()` may pick it (§4.K send step 4).
pub fn wake_for_ipc(id: TaskId) {
    set_blocked_on_receive(id, false);
}

/// Gives read/write access to `id`'s mailbox for the IPC layer, without
/// exposing the rest of the scheduler's internals.
pub fn with_mailbox<R>(id: TaskId, f: impl FnOnce(&mut crate::ipc::Mailbox) -> R) -> Option<R> {
    let mut scheduler = SCHEDULER.lock();
    scheduler.get_mut(id).map(|t| f(&mut t.mailbox))
}

/// True if `id` names a live, non-Zombie task (§4.K send step 1).
pub fn task_exists(id: TaskId) -> bool {
    SCHEDULER.lock().get(id).map(|t| t.state != TaskState::Zombie).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests exercise a private `Scheduler` instance directly
    // rather than the process-wide `SCHEDULER` static, mirroring the
    // isolation pattern used in `mm::pmm`/`mm::heap` tests: real context
    // switching needs a live stack and CPU, neither of which the host
    // test process can safely provide, so these tests check the
    // round-robin *selection* policy against a scheduler whose tasks
    // never actually run.

    extern "C" fn noop_entry(_arg: usize) -> ! {
        loop {}
    }

    fn scheduler_with_tasks(names: &[&str]) -> Scheduler {
        let mut scheduler = Scheduler::empty();
        for name in names {
            scheduler.create(name, noop_entry, 0);
        }
        scheduler.current_index = 0;
        if let Some(first) = scheduler.tasks.iter_mut().flatten().next() {
            first.state = TaskState::Running;
        }
        scheduler
    }

    #[test]
    fn pick_next_rotates_through_ready_tasks() {
        let scheduler = scheduler_with_tasks(&["a", "b", "c"]);
        let next = scheduler.pick_next();
        assert_eq!(scheduler.roster[next], TaskId(1));
    }

    #[test]
    fn pick_next_skips_non_ready_tasks() {
        let mut scheduler = scheduler_with_tasks(&["a", "b", "c"]);
        let b_id = scheduler.roster[1];
        scheduler.get_mut(b_id).unwrap().state = TaskState::Blocked;
        let next = scheduler.pick_next();
        assert_eq!(scheduler.roster[next], TaskId(2));
    }

    #[test]
    fn pick_next_falls_back_to_idle_when_nothing_ready() {
        let mut scheduler = scheduler_with_tasks(&["idle", "worker"]);
        scheduler.idle_id = Some(scheduler.roster[0]);
        let worker_id = scheduler.roster[1];
        scheduler.get_mut(worker_id).unwrap().state = TaskState::Blocked;
        let next = scheduler.pick_next();
        assert_eq!(scheduler.roster[next], scheduler.idle_id.unwrap());
    }

    #[test]
    fn scenario_5_round_robin_fairness_of_selection_order() {
        // Three always-Ready CPU-bound tasks: over many rotations each
        // is chosen an equal number of times (the actual tick-count
        // fairness bound is an emergent property of calling `pick_next`
        // once per tick, exercised at the selection-policy level here).
        let mut scheduler = scheduler_with_tasks(&["t1", "t2", "t3"]);
        let mut tally = [0usize; 3];
        for _ in 0..300 {
            let next = scheduler.pick_next();
            tally[next] += 1;
            scheduler.current_index = next;
        }
        let max = *tally.iter().max().unwrap();
        let min = *tally.iter().min().unwrap();
        assert!(max - min <= 1, "rotation should be evenly distributed: {tally:?}");
    }
}
