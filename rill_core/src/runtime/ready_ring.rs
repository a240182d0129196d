use std::collections::VecDeque;

use crate::error::RillError;

use super::process::ProcIndex;

/// FIFO ring of runnable processes.
///
/// The front of the deque is the ring head, the back is the tail.
/// The scheduler does not dequeue-and-requeue every turn; it rotates
/// the ring one position and peeks the new head without removing it.
/// Staying runnable is therefore the zero-cost default, and a process
/// that blocks or terminates unlinks itself (the head) during its own
/// step.
#[derive(Debug, Default)]
pub struct ReadyRing {
    ring: VecDeque<ProcIndex>,
}

impl ReadyRing {
    pub fn new() -> Self {
        Self {
            ring: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Append after the tail, O(1). Preserves FIFO order.
    pub fn enqueue(&mut self, pid: ProcIndex) {
        self.ring.push_back(pid);
    }

    /// Advance the ring one position: the head becomes the tail.
    /// No-op on an empty ring.
    pub fn rotate(&mut self) {
        if let Some(pid) = self.ring.pop_front() {
            self.ring.push_back(pid);
        }
    }

    /// The current head, without removing it. An empty ring is the
    /// "no runnable process" deadlock condition.
    pub fn peek_head(&self) -> Result<ProcIndex, RillError> {
        self.ring.front().copied().ok_or_else(RillError::empty_queue)
    }

    /// Remove and return the head.
    pub fn dequeue_head(&mut self) -> Result<ProcIndex, RillError> {
        self.ring.pop_front().ok_or_else(RillError::empty_queue)
    }

    /// Unlink `pid`, which must be the current head. Only the running
    /// process may remove itself; anything else is structural corruption.
    pub(crate) fn unlink_head(&mut self, pid: ProcIndex) -> Result<(), RillError> {
        match self.ring.front() {
            Some(&head) if head == pid => {
                self.ring.pop_front();
                Ok(())
            }
            Some(_) => Err(RillError::invariant(
                "process unlinking from the ready ring is not the head",
            )),
            None => Err(RillError::invariant(
                "process unlinking from an empty ready ring",
            )),
        }
    }
}
