//! Bounded mailbox IPC (component K, §4.K).
//!
//! Each task owns one fixed-capacity ring buffer of messages. `send` is
//! non-blocking; `receive` blocks the caller (via the scheduler) until a
//! message arrives. Ordering: per-sender FIFO to each receiver (§5).

use heapless::Deque;

use crate::error::{Errno, KernelError};
use crate::task::tcb::TaskId;

pub const MAILBOX_CAPACITY: usize = 16;
pub const MAX_PAYLOAD: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct Message {
    pub sender: TaskId,
    pub tag: u32,
    pub len: usize,
    pub payload: [u8; MAX_PAYLOAD],
}

impl Message {
    pub fn new(sender: TaskId, tag: u32, bytes: &[u8]) -> Self {
        let len = bytes.len().min(MAX_PAYLOAD);
        let mut payload = [0u8; MAX_PAYLOAD];
        payload[..len].copy_from_slice(&bytes[..len]);
        Self { sender, tag, len, payload }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}

/// A per-task mailbox. `heapless::Deque` already maintains the
/// head/tail/count ring-buffer invariants §3 and §8.8 require; this
/// type only adds the domain operations (`send`/`receive`) on top.
pub struct Mailbox {
    queue: Deque<Message, MAILBOX_CAPACITY>,
}

impl Mailbox {
    pub const fn new() -> Self {
        Self { queue: Deque::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.len() == MAILBOX_CAPACITY
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    fn enqueue(&mut self, message: Message) -> Result<(), KernelError> {
        self.queue.push_back(message).map_err(|_| KernelError::MailboxFull)
    }

    fn dequeue(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivers `message` to `dest`'s mailbox (§4.K send steps 1-4). The
/// sender id inside `message` is overwritten with `sender`, never
/// trusted from the caller.
pub fn send(sender: TaskId, dest: TaskId, tag: u32, payload: &[u8]) -> Result<(), Errno> {
    if !crate::task::scheduler::task_exists(dest) {
        return Err(KernelError::DestMissing.into());
    }

    let message = Message::new(sender, tag, payload);
    let enqueue_result = crate::task::scheduler::with_mailbox(dest, |mailbox| mailbox.enqueue(message));

    match enqueue_result {
        Some(Ok(())) => {
            if crate::task::scheduler::is_blocked_on_receive(dest) {
                crate::task::scheduler::wake_for_ipc(dest);
            }
            Ok(())
        }
        Some(Err(e)) => Err(e.into()),
        None => Err(KernelError::DestMissing.into()),
    }
}

/// Blocks the calling task until a message arrives, then returns it
/// (§4.K receive). `caller` must be the currently running task.
pub fn receive(caller: TaskId) -> Message {
    loop {
        let popped = crate::task::scheduler::with_mailbox(caller, |mailbox| mailbox.dequeue());
        if let Some(Some(message)) = popped {
            return message;
        }

        crate::task::scheduler::set_blocked_on_receive(caller, true);
        crate::task::scheduler::task_yield();
        // On wakeup (§4.K send step 4 cleared `blocked_on_receive`), loop
        // around and drain the message that woke us.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_starts_empty_and_not_full() {
        let mailbox = Mailbox::new();
        assert!(mailbox.is_empty());
        assert!(!mailbox.is_full());
        assert_eq!(mailbox.len(), 0);
    }

    #[test]
    fn fifo_ordering_within_one_sender() {
        let mut mailbox = Mailbox::new();
        let sender = TaskId(7);
        mailbox.enqueue(Message::new(sender, 0, b"x")).unwrap();
        mailbox.enqueue(Message::new(sender, 0, b"y")).unwrap();
        mailbox.enqueue(Message::new(sender, 0, b"z")).unwrap();

        assert_eq!(mailbox.dequeue().unwrap().bytes(), b"x");
        assert_eq!(mailbox.dequeue().unwrap().bytes(), b"y");
        assert_eq!(mailbox.dequeue().unwrap().bytes(), b"z");
        assert!(mailbox.dequeue().is_none());
    }

    #[test]
    fn full_mailbox_rejects_further_sends() {
        let mut mailbox = Mailbox::new();
        for i in 0..MAILBOX_CAPACITY {
            mailbox.enqueue(Message::new(TaskId(0), i as u32, b"m")).unwrap();
        }
        assert!(mailbox.is_full());
        let result = mailbox.enqueue(Message::new(TaskId(0), 99, b"overflow"));
        assert!(matches!(result, Err(KernelError::MailboxFull)));
    }

    #[test]
    fn message_truncates_oversized_payload() {
        let huge = [b'a'; MAX_PAYLOAD + 100];
        let message = Message::new(TaskId(1), 0, &huge);
        assert_eq!(message.len, MAX_PAYLOAD);
    }
}
