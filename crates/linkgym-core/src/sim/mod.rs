//! Single-threaded discrete-event scheduler
//!
//! Drives a scenario context `C` through a time-ordered queue of callbacks.
//! Callbacks run to completion on the calling thread and may schedule
//! further callbacks; simulated time only moves between callbacks, never
//! inside one. Ties at the same timestamp run in scheduling order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::trace;

type EventFn<C> = Box<dyn FnOnce(&mut C, &mut Scheduler<C>)>;

struct Entry<C> {
    at_ms: u64,
    seq: u64,
    callback: EventFn<C>,
}

// Ordering on (time, seq) only; BinaryHeap is a max-heap so compare
// reversed to pop the earliest event first.
impl<C> Ord for Entry<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at_ms, other.seq).cmp(&(self.at_ms, self.seq))
    }
}

impl<C> PartialOrd for Entry<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C> PartialEq for Entry<C> {
    fn eq(&self, other: &Self) -> bool {
        self.at_ms == other.at_ms && self.seq == other.seq
    }
}

impl<C> Eq for Entry<C> {}

/// Event queue plus the simulated clock
pub struct Scheduler<C> {
    queue: BinaryHeap<Entry<C>>,
    now_ms: u64,
    next_seq: u64,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    /// An empty scheduler at time zero
    pub fn new() -> Self {
        Self { queue: BinaryHeap::new(), now_ms: 0, next_seq: 0 }
    }

    /// Current simulated time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Number of events not yet run
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Schedule a callback at an absolute simulated time. Times in the
    /// past run at the current time, after already-queued events.
    pub fn schedule_at<F>(&mut self, at_ms: u64, callback: F)
    where
        F: FnOnce(&mut C, &mut Scheduler<C>) + 'static,
    {
        let at_ms = at_ms.max(self.now_ms);
        let seq = self.next_seq;
        self.next_seq += 1;
        trace!(at_ms, seq, "event scheduled");
        self.queue.push(Entry { at_ms, seq, callback: Box::new(callback) });
    }

    /// Schedule a callback relative to the current simulated time
    pub fn schedule_in<F>(&mut self, delay_ms: u64, callback: F)
    where
        F: FnOnce(&mut C, &mut Scheduler<C>) + 'static,
    {
        self.schedule_at(self.now_ms.saturating_add(delay_ms), callback);
    }

    /// Run events up to and including `end_ms`. Later events stay queued
    /// and the clock lands on `end_ms`.
    pub fn run_until(&mut self, ctx: &mut C, end_ms: u64) {
        while let Some(head) = self.queue.peek() {
            if head.at_ms > end_ms {
                break;
            }
            // Callbacks may push new events, so pop before running.
            let entry = match self.queue.pop() {
                Some(entry) => entry,
                None => break,
            };
            self.now_ms = entry.at_ms;
            trace!(now_ms = self.now_ms, seq = entry.seq, "event fired");
            (entry.callback)(ctx, self);
        }
        self.now_ms = self.now_ms.max(end_ms);
    }

    /// Run until the queue drains
    pub fn run(&mut self, ctx: &mut C) {
        while let Some(entry) = self.queue.pop() {
            self.now_ms = entry.at_ms;
            (entry.callback)(ctx, self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_run_in_time_order() {
        let mut sched: Scheduler<Vec<u64>> = Scheduler::new();
        let mut log = Vec::new();
        sched.schedule_at(30, |log: &mut Vec<u64>, s| log.push(s.now_ms()));
        sched.schedule_at(10, |log: &mut Vec<u64>, s| log.push(s.now_ms()));
        sched.schedule_at(20, |log: &mut Vec<u64>, s| log.push(s.now_ms()));
        sched.run(&mut log);
        assert_eq!(log, vec![10, 20, 30]);
    }

    #[test]
    fn test_same_time_fifo() {
        let mut sched: Scheduler<Vec<u32>> = Scheduler::new();
        let mut log = Vec::new();
        for tag in 0..4u32 {
            sched.schedule_at(5, move |log: &mut Vec<u32>, _| log.push(tag));
        }
        sched.run(&mut log);
        assert_eq!(log, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_callback_schedules_followup() {
        struct Ctx {
            fired: Vec<u64>,
        }
        fn tick(ctx: &mut Ctx, sched: &mut Scheduler<Ctx>) {
            ctx.fired.push(sched.now_ms());
            if ctx.fired.len() < 3 {
                sched.schedule_in(100, tick);
            }
        }
        let mut ctx = Ctx { fired: Vec::new() };
        let mut sched = Scheduler::new();
        sched.schedule_at(50, tick);
        sched.run(&mut ctx);
        assert_eq!(ctx.fired, vec![50, 150, 250]);
    }

    #[test]
    fn test_run_until_leaves_later_events() {
        let mut sched: Scheduler<Vec<u64>> = Scheduler::new();
        let mut log = Vec::new();
        sched.schedule_at(100, |log: &mut Vec<u64>, s| log.push(s.now_ms()));
        sched.schedule_at(300, |log: &mut Vec<u64>, s| log.push(s.now_ms()));
        sched.run_until(&mut log, 200);
        assert_eq!(log, vec![100]);
        assert_eq!(sched.now_ms(), 200);
        assert_eq!(sched.pending(), 1);
        sched.run_until(&mut log, 400);
        assert_eq!(log, vec![100, 300]);
    }

    #[test]
    fn test_past_time_clamps_to_now() {
        let mut sched: Scheduler<Vec<u64>> = Scheduler::new();
        let mut log = Vec::new();
        sched.schedule_at(100, |log: &mut Vec<u64>, s| {
            s.schedule_at(10, |log: &mut Vec<u64>, s| log.push(s.now_ms()));
        });
        sched.run(&mut log);
        assert_eq!(log, vec![100]);
    }
}
