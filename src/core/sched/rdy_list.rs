//! Ready queue - per-priority FIFO lists of thread ids
//!
//! Each priority level has its own list. Threads are added to the tail
//! (FIFO among equal priorities) and dispatched from the head of the highest
//! non-empty level, which the priority bitmap finds in constant time.
//!
//! The running thread is never on the ready queue.

use crate::config::{CFG_PRIO_MAX, CFG_THREADS_MAX};
use crate::error::{OsError, OsResult};
use crate::prio::PrioTable;
use crate::types::{OsPrio, ThreadId};

/// Ready list for a single priority level
#[derive(Debug, Clone, Copy)]
struct ReadyList {
    head: Option<ThreadId>,
    tail: Option<ThreadId>,
}

impl ReadyList {
    const fn new() -> Self {
        ReadyList { head: None, tail: None }
    }
}

/// Priority-ordered collection of runnable threads
#[derive(Debug, Clone, Copy)]
pub struct ReadyQueue {
    lists: [ReadyList; CFG_PRIO_MAX],
    /// Intrusive `next` links, indexed by thread id
    next: [Option<ThreadId>; CFG_THREADS_MAX],
    queued: [bool; CFG_THREADS_MAX],
    prio_tbl: PrioTable,
    len: usize,
}

impl ReadyQueue {
    /// Create a new empty ready queue
    pub const fn new() -> Self {
        ReadyQueue {
            lists: [ReadyList::new(); CFG_PRIO_MAX],
            next: [None; CFG_THREADS_MAX],
            queued: [false; CFG_THREADS_MAX],
            prio_tbl: PrioTable::new(),
            len: 0,
        }
    }

    /// Append a thread at the tail of its priority level
    ///
    /// Fails with `QueueError` if the thread is already queued or the
    /// priority is out of range; the queue is left untouched in that case.
    pub fn enqueue(&mut self, id: ThreadId, prio: OsPrio) -> OsResult<()> {
        if prio as usize >= CFG_PRIO_MAX || self.queued[id.index()] {
            return Err(OsError::QueueError);
        }

        let list = &mut self.lists[prio as usize];
        self.next[id.index()] = None;
        match list.tail {
            Some(tail) => self.next[tail.index()] = Some(id),
            None => list.head = Some(id),
        }
        list.tail = Some(id);

        self.queued[id.index()] = true;
        self.prio_tbl.insert(prio);
        self.len += 1;
        Ok(())
    }

    /// Remove and return the first thread of the highest ready priority
    pub fn dequeue(&mut self) -> Option<ThreadId> {
        let prio = self.prio_tbl.highest()?;
        let list = &mut self.lists[prio as usize];
        let id = list.head?;

        list.head = self.next[id.index()].take();
        if list.head.is_none() {
            list.tail = None;
            self.prio_tbl.remove(prio);
        }

        self.queued[id.index()] = false;
        self.len -= 1;
        Some(id)
    }

    /// Highest priority with a ready thread
    #[inline]
    pub fn highest_prio(&self) -> Option<OsPrio> {
        self.prio_tbl.highest()
    }

    /// Check if a thread is on the queue
    #[inline]
    pub fn contains(&self, id: ThreadId) -> bool {
        self.queued[id.index()]
    }

    /// Number of queued threads
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
