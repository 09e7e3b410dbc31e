// queue of parked operations waiting on the channel.

use std::{
    collections::VecDeque,
    task::Waker,
};


// identifies a waiter within the WaitQueue that issued it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct WaiterId(u64);

// FIFO queue of pending send or recv operations.
//
// an operation joins the back of the queue when its future is created and leaves it when the
// future resolves or is cancelled. only the operation at the front may complete, which is what
// makes waiters fair amongst themselves.
#[derive(Default)]
pub(crate) struct WaitQueue {
    // id to issue to the next waiter.
    next_id: u64,
    // linked waiters, front first.
    waiters: VecDeque<Waiter>,
}

struct Waiter {
    id: WaiterId,
    // installed when the operation's future returns pending.
    waker: Option<Waker>,
}

impl WaitQueue {
    // construct empty queue.
    pub(crate) fn new() -> Self {
        WaitQueue::default()
    }

    // link a new waiter to the back of the queue.
    pub(crate) fn push(&mut self) -> WaiterId {
        let id = WaiterId(self.next_id);
        self.next_id += 1;
        self.waiters.push_back(Waiter { id, waker: None });
        id
    }

    // whether the waiter is at the front of this queue.
    pub(crate) fn is_front(&self, id: WaiterId) -> bool {
        self.waiters.front().is_some_and(|waiter| waiter.id == id)
    }

    // install the waker to be waked when the waiter may be able to make progress.
    //
    // panics if the waiter is not linked.
    pub(crate) fn register(&mut self, id: WaiterId, waker: &Waker) {
        let waiter = self.waiters.iter_mut()
            .find(|waiter| waiter.id == id)
            .expect("registered waker for unlinked waiter (internal bug)");
        match &mut waiter.waker {
            Some(old) if old.will_wake(waker) => (),
            slot => *slot = Some(waker.clone()),
        }
    }

    // unlink the waiter, dropping its waker. returns whether it was linked.
    pub(crate) fn remove(&mut self, id: WaiterId) -> bool {
        // waiters are almost always removed from at or near the front
        match self.waiters.iter().position(|waiter| waiter.id == id) {
            Some(idx) => {
                self.waiters.remove(idx);
                true
            }
            None => false,
        }
    }

    // take and wake the waker of the front waiter, if there is one and it has a waker.
    pub(crate) fn wake_front(&mut self) {
        if let Some(waker) = self.waiters.front_mut().and_then(|waiter| waiter.waker.take()) {
            waker.wake();
        }
    }
}
