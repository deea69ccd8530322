//! Bounded FIFO of commands waiting for the session to go idle.
//!
//! A command whose id is already queued replaces the queued entry in place:
//! same position, newest data and callbacks.

use std::collections::VecDeque;

use super::command::Command;
use crate::error::{AuroraError, Result};

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Where a command ended up in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueued {
    /// Appended at `position`.
    Appended(usize),
    /// Replaced the entry with the same id at `position`.
    Replaced(usize),
}

#[derive(Debug)]
pub(crate) struct CommandQueue {
    entries: VecDeque<Command>,
    capacity: usize,
}

impl CommandQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, cmd: Command) -> Result<Enqueued> {
        if let Some(pos) = self.entries.iter().position(|q| q.id() == cmd.id()) {
            self.entries[pos] = cmd;
            return Ok(Enqueued::Replaced(pos));
        }
        if self.entries.len() >= self.capacity {
            return Err(AuroraError::QueueFull(self.capacity));
        }
        self.entries.push_back(cmd);
        Ok(Enqueued::Appended(self.entries.len() - 1))
    }

    pub(crate) fn pop(&mut self) -> Option<Command> {
        self.entries.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn ids(&self) -> Vec<u8> {
        self.entries.iter().map(Command::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut q = CommandQueue::new(8);
        q.push(Command::new(1, [0; 4])).unwrap();
        q.push(Command::new(2, [0; 4])).unwrap();
        q.push(Command::new(3, [0; 4])).unwrap();

        assert_eq!(q.ids(), vec![1, 2, 3]);
        assert_eq!(q.pop().unwrap().id(), 1);
        assert_eq!(q.pop().unwrap().id(), 2);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_same_id_replaced_in_place() {
        let mut q = CommandQueue::new(8);
        assert_eq!(q.push(Command::new(70, [0, 10, 0, 0])).unwrap(), Enqueued::Appended(0));
        assert_eq!(q.push(Command::new(15, [1, 0, 0, 0])).unwrap(), Enqueued::Appended(1));
        assert_eq!(q.push(Command::new(70, [0, 99, 0, 0])).unwrap(), Enqueued::Replaced(0));

        assert_eq!(q.len(), 2);
        let head = q.pop().unwrap();
        assert_eq!(head.id(), 70);
        assert_eq!(head.data(), [0, 99, 0, 0]);
    }

    #[test]
    fn test_capacity() {
        let mut q = CommandQueue::new(2);
        q.push(Command::new(1, [0; 4])).unwrap();
        q.push(Command::new(2, [0; 4])).unwrap();

        assert!(matches!(
            q.push(Command::new(3, [0; 4])),
            Err(AuroraError::QueueFull(2))
        ));
        // Replacing does not need room.
        assert!(q.push(Command::new(2, [5; 4])).is_ok());

        q.clear();
        assert_eq!(q.len(), 0);
    }
}
