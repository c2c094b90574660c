//! Tasks suspended on a queue or semaphore.

use core::task::Waker;

use crate::kernel::{Priority, TaskId};

#[derive(Debug)]
struct Waiter {
    task: TaskId,
    priority: Priority,
    waker: Waker,
}

/// Priority-ordered set of waiting tasks, FIFO among equal priorities.
#[derive(Debug, Default)]
pub(crate) struct WaitList {
    waiters: Vec<Waiter>,
}

impl WaitList {
    /// Adds `task`, or refreshes its waker if it is already waiting.
    pub(crate) fn register(&mut self, task: TaskId, priority: Priority, waker: &Waker) {
        if let Some(waiter) = self.waiters.iter_mut().find(|w| w.task == task) {
            if !waiter.waker.will_wake(waker) {
                waiter.waker = waker.clone();
            }
            return;
        }
        self.waiters.push(Waiter {
            task,
            priority,
            waker: waker.clone(),
        });
    }

    pub(crate) fn remove(&mut self, task: TaskId) {
        self.waiters.retain(|w| w.task != task);
    }

    /// Unblocks the highest-priority waiter and returns its priority.
    pub(crate) fn wake_highest(&mut self) -> Option<Priority> {
        let mut best: Option<usize> = None;
        for (pos, waiter) in self.waiters.iter().enumerate() {
            if best.map_or(true, |top| waiter.priority > self.waiters[top].priority) {
                best = Some(pos);
            }
        }
        let waiter = self.waiters.remove(best?);
        waiter.waker.wake();
        Some(waiter.priority)
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker;

    #[test]
    fn wakes_highest_priority_first() {
        let waker = noop_waker();
        let mut list = WaitList::default();
        list.register(TaskId(0), Priority(1), &waker);
        list.register(TaskId(1), Priority(3), &waker);
        list.register(TaskId(2), Priority(2), &waker);

        assert_eq!(list.wake_highest(), Some(Priority(3)));
        assert_eq!(list.wake_highest(), Some(Priority(2)));
        assert_eq!(list.wake_highest(), Some(Priority(1)));
        assert_eq!(list.wake_highest(), None);
    }

    #[test]
    fn equal_priorities_wake_in_arrival_order() {
        let waker = noop_waker();
        let mut list = WaitList::default();
        list.register(TaskId(4), Priority(2), &waker);
        list.register(TaskId(7), Priority(2), &waker);

        list.wake_highest();
        assert_eq!(list.len(), 1);
        list.remove(TaskId(7));
        assert!(list.is_empty());
    }

    #[test]
    fn re_registering_does_not_duplicate() {
        let waker = noop_waker();
        let mut list = WaitList::default();
        list.register(TaskId(1), Priority(1), &waker);
        list.register(TaskId(1), Priority(1), &waker);
        assert_eq!(list.len(), 1);
    }
}
