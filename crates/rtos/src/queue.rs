//! Bounded FIFO queue shared by tasks, timer callbacks and interrupt handlers.
//!
//! Items are moved into a fixed ring of `capacity` slots allocated once at
//! creation; the item type fixes the item size. Task-context calls may
//! suspend up to their [`Timeout`]. The `*_from_isr` calls never suspend and
//! instead fold "a higher-priority task was woken" into a [`WakeFlag`].

use core::future::poll_fn;
use core::mem;
use core::task::Poll;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ContractViolation, Error, Result};
use crate::interrupt::WakeFlag;
use crate::kernel::{Kernel, Timeout};
use crate::waitlist::WaitList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Back,
    Front,
}

/// Fixed-capacity ring buffer.
///
/// `head` indexes the oldest item and `tail` the next free slot; they only
/// coincide when the ring is empty or full.
struct Ring<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    count: usize,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        self.count
    }

    fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    fn push(&mut self, item: T, end: End) -> core::result::Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        let capacity = self.capacity();
        match end {
            End::Back => {
                self.slots[self.tail] = Some(item);
                self.tail = (self.tail + 1) % capacity;
            }
            End::Front => {
                self.head = (self.head + capacity - 1) % capacity;
                self.slots[self.head] = Some(item);
            }
        }
        self.count += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        item
    }

    fn front(&self) -> Option<&T> {
        if self.count == 0 {
            None
        } else {
            self.slots[self.head].as_ref()
        }
    }

    fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }
}

struct QueueState<T> {
    ring: Ring<T>,
    receivers: WaitList,
    senders: WaitList,
}

/// Handle to a bounded queue. Clones refer to the same queue.
pub struct Queue<T> {
    kernel: Kernel,
    state: Arc<Mutex<QueueState<T>>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            kernel: self.kernel.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send> Queue<T> {
    /// Creates a queue holding at most `capacity` items.
    pub fn new(kernel: &Kernel, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(kernel.violation(ContractViolation::ZeroCapacity));
        }
        log::debug!(
            "created queue of {capacity} x {} byte items",
            mem::size_of::<T>()
        );
        Ok(Self {
            kernel: kernel.clone(),
            state: Arc::new(Mutex::new(QueueState {
                ring: Ring::with_capacity(capacity),
                receivers: WaitList::default(),
                senders: WaitList::default(),
            })),
        })
    }

    /// Appends `item`, suspending while the queue is full.
    ///
    /// Returns `Full` for a zero timeout and `Timeout` when a bounded wait
    /// elapses. Yields straight after the send when it readied a receiver
    /// of higher priority than the caller.
    pub async fn send(&self, item: T, timeout: Timeout) -> Result<()> {
        self.post(item, timeout, End::Back).await
    }

    pub async fn send_to_back(&self, item: T, timeout: Timeout) -> Result<()> {
        self.post(item, timeout, End::Back).await
    }

    /// Like [`Queue::send`] but the item jumps ahead of everything queued.
    pub async fn send_to_front(&self, item: T, timeout: Timeout) -> Result<()> {
        self.post(item, timeout, End::Front).await
    }

    /// Removes the oldest item, suspending while the queue is empty.
    pub async fn receive(&self, timeout: Timeout) -> Result<T> {
        self.kernel.check_blocking_call(timeout)?;
        let deadline = self.kernel.deadline(timeout);

        let (item, woken) = poll_fn(|cx| {
            let mut state = self.state.lock();
            if let Some(item) = state.ring.pop() {
                self.kernel.release(&mut state.receivers);
                let woken = self.kernel.wake_one(&mut state.senders);
                return Poll::Ready(Ok((item, woken)));
            }
            self.kernel
                .park(&mut state.receivers, deadline, cx, Error::Empty)
                .map(Err)
        })
        .await?;

        self.kernel.preempt_if(woken).await;
        Ok(item)
    }

    /// Zero-timeout send for contexts that cannot `await`, such as timer
    /// callbacks. Refused in task context, where
    /// `send(item, Timeout::Immediate)` yields to the task it readies.
    pub fn try_send(&self, item: T) -> Result<()> {
        self.kernel.check_sync_call()?;
        let mut state = self.state.lock();
        state.ring.push(item, End::Back).map_err(|_| Error::Full)?;
        self.kernel.wake_one(&mut state.receivers);
        Ok(())
    }

    /// Zero-timeout receive for contexts that cannot `await`. Refused in
    /// task context like [`Queue::try_send`].
    pub fn try_receive(&self) -> Result<T> {
        self.kernel.check_sync_call()?;
        let mut state = self.state.lock();
        let item = state.ring.pop().ok_or(Error::Empty)?;
        self.kernel.wake_one(&mut state.senders);
        Ok(item)
    }

    /// Interrupt-safe send. Never suspends; `Full` leaves `woken` untouched.
    pub fn send_from_isr(&self, item: T, woken: &mut WakeFlag) -> Result<()> {
        self.post_from_isr(item, End::Back, woken)
    }

    pub fn send_to_front_from_isr(&self, item: T, woken: &mut WakeFlag) -> Result<()> {
        self.post_from_isr(item, End::Front, woken)
    }

    /// Interrupt-safe receive. Never suspends; `Empty` leaves `woken`
    /// untouched.
    pub fn receive_from_isr(&self, woken: &mut WakeFlag) -> Result<T> {
        let mut state = self.state.lock();
        let item = state.ring.pop().ok_or(Error::Empty)?;
        if self.kernel.wake_one(&mut state.senders) {
            woken.set();
        }
        log::trace!("receive_from_isr: {} left", state.ring.len());
        Ok(item)
    }

    /// Number of queued items. Stale as soon as the lock is released.
    pub fn count(&self) -> usize {
        self.state.lock().ring.len()
    }

    pub fn spaces_available(&self) -> usize {
        let state = self.state.lock();
        state.ring.capacity() - state.ring.len()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().ring.capacity()
    }

    /// Size in bytes of one item slot.
    pub fn item_size(&self) -> usize {
        mem::size_of::<T>()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().ring.is_full()
    }

    pub fn waiting_receivers(&self) -> usize {
        self.state.lock().receivers.len()
    }

    pub fn waiting_senders(&self) -> usize {
        self.state.lock().senders.len()
    }

    /// Discards every queued item and lets blocked senders retry, yielding
    /// if one of them outranks the caller.
    pub async fn reset(&self) {
        let woken = {
            let mut state = self.state.lock();
            state.ring.clear();
            let mut highest = None;
            while let Some(priority) = state.senders.wake_highest() {
                highest = highest.max(Some(priority));
            }
            highest.map_or(false, |priority| priority > self.kernel.running_priority())
        };
        self.kernel.preempt_if(woken).await;
    }

    async fn post(&self, item: T, timeout: Timeout, end: End) -> Result<()> {
        self.kernel.check_blocking_call(timeout)?;
        let deadline = self.kernel.deadline(timeout);
        let mut pending = Some(item);

        let woken = poll_fn(|cx| {
            let mut state = self.state.lock();
            if let Some(item) = pending.take() {
                match state.ring.push(item, end) {
                    Ok(()) => {
                        self.kernel.release(&mut state.senders);
                        let woken = self.kernel.wake_one(&mut state.receivers);
                        return Poll::Ready(Ok(woken));
                    }
                    Err(item) => pending = Some(item),
                }
            }
            self.kernel
                .park(&mut state.senders, deadline, cx, Error::Full)
                .map(Err)
        })
        .await?;

        self.kernel.preempt_if(woken).await;
        Ok(())
    }

    fn post_from_isr(&self, item: T, end: End, woken: &mut WakeFlag) -> Result<()> {
        let mut state = self.state.lock();
        state.ring.push(item, end).map_err(|_| Error::Full)?;
        if self.kernel.wake_one(&mut state.receivers) {
            woken.set();
        }
        log::trace!("send_from_isr: {} queued", state.ring.len());
        Ok(())
    }
}

impl<T: Clone + Send> Queue<T> {
    /// Copies the oldest item without removing it.
    pub fn peek_from_isr(&self) -> Result<T> {
        self.state.lock().ring.front().cloned().ok_or(Error::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wraps_around() {
        let mut ring = Ring::with_capacity(3);
        for value in 0..3 {
            ring.push(value, End::Back).unwrap();
        }
        assert_eq!(ring.push(9, End::Back), Err(9));
        assert_eq!(ring.head, ring.tail);

        assert_eq!(ring.pop(), Some(0));
        ring.push(3, End::Back).unwrap();
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), None);
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn front_insert_is_read_first() {
        let mut ring = Ring::with_capacity(3);
        ring.push(1, End::Back).unwrap();
        ring.push(2, End::Back).unwrap();
        ring.push(0, End::Front).unwrap();

        assert_eq!(ring.front(), Some(&0));
        assert_eq!(ring.pop(), Some(0));
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
    }

    #[test]
    fn single_slot_ring() {
        let mut ring = Ring::with_capacity(1);
        ring.push('a', End::Back).unwrap();
        assert!(ring.is_full());
        assert_eq!(ring.push('b', End::Front), Err('b'));
        assert_eq!(ring.pop(), Some('a'));
        ring.push('c', End::Back).unwrap();
        assert_eq!(ring.pop(), Some('c'));
    }

    #[test]
    fn clear_resets_indices() {
        let mut ring = Ring::with_capacity(2);
        ring.push(1u8, End::Back).unwrap();
        ring.pop();
        ring.push(2, End::Back).unwrap();
        ring.clear();
        assert_eq!((ring.head, ring.tail, ring.len()), (0, 0, 0));
        assert_eq!(ring.front(), None);
    }
}
