//! Bounded per-machine command queues.
//!
//! Each machine owns one crossbeam bounded channel. Any number of threads may
//! enqueue; the dispatch loop is the only consumer. The id to queue map sits
//! behind its own mutex, which is always taken after the registry lock.
//!
//! Every created queue gets a fresh generation. A command popped from a
//! handle whose generation is no longer in the map belongs to a removed
//! machine and must not run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use thiserror::Error;
use world_runtime::Command;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("no command queue for machine {0}")]
    Missing(String),
    #[error("command queue for machine {0} is full")]
    Full(String),
}

/// Cloneable access to one machine's queue.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    generation: u64,
    sender: Sender<Command>,
    receiver: Receiver<Command>,
}

impl QueueHandle {
    fn with_capacity(capacity: usize, generation: u64) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            generation,
            sender,
            receiver,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn try_pop(&self) -> Option<Command> {
        match self.receiver.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    fn discard_pending(&self) -> usize {
        self.receiver.try_iter().count()
    }
}

#[derive(Debug)]
pub struct CommandQueues {
    capacity: usize,
    next_generation: AtomicU64,
    queues: Mutex<BTreeMap<String, QueueHandle>>,
}

impl CommandQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_generation: AtomicU64::new(1),
            queues: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, QueueHandle>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty queue for `machine_id`, replacing (and emptying) any
    /// existing one.
    pub fn create(&self, machine_id: &str) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let replaced = self.lock().insert(
            machine_id.to_string(),
            QueueHandle::with_capacity(self.capacity, generation),
        );
        if let Some(old) = replaced {
            old.discard_pending();
        }
    }

    /// Drop the queue and any commands still pending in it. Returns the
    /// number of discarded commands, or `None` if there was no queue.
    ///
    /// Pending commands are drained so that handles cloned by an in-progress
    /// tick see an empty channel.
    pub fn remove(&self, machine_id: &str) -> Option<usize> {
        self.lock()
            .remove(machine_id)
            .map(|handle| handle.discard_pending())
    }

    /// True while `generation` is the live queue for `machine_id`.
    pub fn is_current(&self, machine_id: &str, generation: u64) -> bool {
        self.lock()
            .get(machine_id)
            .map_or(false, |handle| handle.generation == generation)
    }

    /// Push without blocking. On success returns the queue depth including
    /// the new command.
    pub fn enqueue(&self, machine_id: &str, command: Command) -> Result<usize, QueueError> {
        let handle = self
            .lock()
            .get(machine_id)
            .cloned()
            .ok_or_else(|| QueueError::Missing(machine_id.to_string()))?;
        match handle.sender.try_send(command) {
            Ok(()) => Ok(handle.len()),
            Err(TrySendError::Full(_)) => Err(QueueError::Full(machine_id.to_string())),
            Err(TrySendError::Disconnected(_)) => Err(QueueError::Missing(machine_id.to_string())),
        }
    }

    pub fn dequeue(&self, machine_id: &str) -> Option<Command> {
        let handle = self.lock().get(machine_id).cloned()?;
        handle.try_pop()
    }

    /// True for an empty queue and for a machine without one.
    pub fn is_empty(&self, machine_id: &str) -> bool {
        self.lock()
            .get(machine_id)
            .map_or(true, QueueHandle::is_empty)
    }

    pub fn len(&self, machine_id: &str) -> usize {
        self.lock().get(machine_id).map_or(0, QueueHandle::len)
    }

    /// Stable copy of the current queue set, ordered by machine id.
    pub fn snapshot(&self) -> Vec<(String, QueueHandle)> {
        self.lock()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect()
    }

    /// Pending command count per machine.
    pub fn depths(&self) -> BTreeMap<String, usize> {
        self.lock()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.len()))
            .collect()
    }

    /// Drop every queue. Returns how many commands were discarded.
    pub fn clear(&self) -> usize {
        let mut queues = self.lock();
        let discarded = queues.values().map(QueueHandle::discard_pending).sum();
        queues.clear();
        discarded
    }
}
