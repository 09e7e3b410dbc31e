// minimal safe API for the queue. the exposed API is a convenience wrapper around this.
//
// all buffer mutation happens while holding the one mutex: sends, recvs, and shuffle rounds. the
// shuffler never releases the lock while it holds elems outside the buffer, so nobody can observe
// the buffer with elems missing.

use super::wait_queue::{WaitQueue, WaiterId};
use rand::Rng;
use std::{
    collections::VecDeque,
    mem,
    sync::{
        atomic::{
            Ordering::Relaxed,
            AtomicU64,
            AtomicUsize,
        },
        Arc,
        Mutex,
        MutexGuard,
    },
    task::{Context, Poll, Waker},
};


// handle to a queue.
pub(crate) struct Queue<T>(Arc<Shared<T>>);

// queue shared state.
struct Shared<T> {
    // mutex around lockable state.
    lockable: Mutex<Lockable<T>>,
    // number of elems logically held. only written while locked, so it may be read without
    // locking. always 0 for a zero-capacity queue.
    len: AtomicUsize,
    // maximum number of elems logically held. never changes.
    cap: usize,
    // number of completed shuffle rounds.
    rounds: AtomicU64,
}

// queue lockable state.
struct Lockable<T> {
    // storage for elements.
    elems: VecDeque<T>,
    // wait queue for send futures.
    send_waiters: WaitQueue,
    // wait queue for recv futures.
    recv_waiters: WaitQueue,
    // total number of elems ever taken by recv futures.
    taken: u64,
    // waker of the zero-capacity send whose elem is currently buffered waiting for a receiver.
    handoff: Option<Waker>,
    // lifecycle of the shuffler.
    shuffler: ShufflerState,
}

// shuffler lifecycle. once stopped, never runs again.
enum ShufflerState {
    // may still run rounds.
    Running {
        // waked once elems are buffered. installed while the buffer is empty.
        round: Option<Waker>,
        // waked only upon stopping. installed while pausing between rounds.
        stop: Option<Waker>,
    },
    Stopped,
}

/// Outcome of a single shuffle round
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Round {
    // only one elem was buffered, and it was put back unchanged.
    Single,
    // two elems were moved to the back in their original order.
    Kept,
    // two elems were moved to the back in swapped order.
    Swapped,
    // the shuffler has been stopped.
    Stopped,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Lockable<T>> {
        self.lockable.lock().unwrap()
    }

    // publish the logical length after elems were pushed or popped.
    fn sync_len(&self, lock: &Lockable<T>) {
        let len = if self.cap == 0 { 0 } else { lock.elems.len() };
        self.len.store(len, Relaxed);
    }
}

impl<T> Lockable<T> {
    // whether a send at the front of the wait queue may push its elem.
    //
    // a zero-capacity queue still buffers one elem at a time, for the duration of a handoff.
    fn has_room(&self, cap: usize) -> bool {
        self.elems.len() < cap.max(1)
    }

    // wake whichever parked parties may now be able to make progress.
    fn notify(&mut self, cap: usize) {
        if !self.elems.is_empty() {
            self.recv_waiters.wake_front();
            if let ShufflerState::Running { round, .. } = &mut self.shuffler {
                if let Some(waker) = round.take() {
                    waker.wake();
                }
            }
        }
        if self.has_room(cap) {
            self.send_waiters.wake_front();
        }
    }
}

impl<T> Queue<T> {
    // construct empty queue with a running shuffler state.
    pub(crate) fn new(cap: usize) -> Self {
        Queue(Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                elems: VecDeque::with_capacity(cap.max(1)),
                send_waiters: WaitQueue::new(),
                recv_waiters: WaitQueue::new(),
                taken: 0,
                handoff: None,
                shuffler: ShufflerState::Running { round: None, stop: None },
            }),
            len: AtomicUsize::new(0),
            cap,
            rounds: AtomicU64::new(0),
        }))
    }

    // clone another handle to the queue.
    pub(crate) fn clone(&self) -> Self {
        Queue(Arc::clone(&self.0))
    }

    // atomic-read the logical length.
    pub(crate) fn len(&self) -> usize {
        self.0.len.load(Relaxed)
    }

    pub(crate) fn cap(&self) -> usize {
        self.0.cap
    }

    // atomic-read the number of completed shuffle rounds.
    pub(crate) fn rounds(&self) -> u64 {
        self.0.rounds.load(Relaxed)
    }

    // construct a send future, linking it to the back of the send wait queue.
    pub(crate) fn send(&self, elem: T) -> Send<T> {
        let id = self.0.lock().send_waiters.push();
        Send {
            shared: Arc::clone(&self.0),
            state: SendState::Waiting { id, elem },
        }
    }

    // construct a recv future, linking it to the back of the recv wait queue.
    pub(crate) fn recv(&self) -> Recv<T> {
        let id = self.0.lock().recv_waiters.push();
        Recv {
            shared: Arc::clone(&self.0),
            id: Some(id),
        }
    }

    // poll for the next shuffle round, and run it if it is ready.
    //
    // pends while the buffer is empty. resolves to stopped once the shuffler has been stopped.
    pub(crate) fn poll_round<R: Rng>(&self, cx: &mut Context, rng: &mut R) -> Poll<Round> {
        let mut lock = self.0.lock();
        if let ShufflerState::Stopped = lock.shuffler {
            return Poll::Ready(Round::Stopped);
        }

        let Some(first) = lock.elems.pop_front() else {
            if let ShufflerState::Running { round, .. } = &mut lock.shuffler {
                *round = Some(cx.waker().clone());
            }
            return Poll::Pending;
        };
        let round = match lock.elems.pop_front() {
            Some(second) => {
                if rng.gen_bool(0.5) {
                    lock.elems.push_back(second);
                    lock.elems.push_back(first);
                    Round::Swapped
                } else {
                    lock.elems.push_back(first);
                    lock.elems.push_back(second);
                    Round::Kept
                }
            }
            None => {
                lock.elems.push_back(first);
                Round::Single
            }
        };
        // elems were only relocated, so len and wait queues are left alone
        self.0.rounds.fetch_add(1, Relaxed);
        Poll::Ready(round)
    }

    // poll for the shuffler being stopped. sends and recvs do not wake this.
    pub(crate) fn poll_stopped(&self, cx: &mut Context) -> Poll<()> {
        let mut lock = self.0.lock();
        match &mut lock.shuffler {
            ShufflerState::Stopped => Poll::Ready(()),
            ShufflerState::Running { stop, .. } => {
                *stop = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    // stop the shuffler, waking it if it is parked. returns whether it was running.
    //
    // once this returns, no further shuffle round will run.
    pub(crate) fn stop_shuffler(&self) -> bool {
        let mut lock = self.0.lock();
        match mem::replace(&mut lock.shuffler, ShufflerState::Stopped) {
            ShufflerState::Running { round, stop } => {
                for waker in [round, stop].into_iter().flatten() {
                    waker.wake();
                }
                true
            }
            ShufflerState::Stopped => false,
        }
    }

    // whether the shuffler has not yet been stopped.
    pub(crate) fn is_shuffling(&self) -> bool {
        matches!(self.0.lock().shuffler, ShufflerState::Running { .. })
    }
}

// send future. internally locks the queue when dropped.
pub(crate) struct Send<T> {
    shared: Arc<Shared<T>>,
    state: SendState<T>,
}

enum SendState<T> {
    // linked into the send wait queue, still holding the elem.
    Waiting {
        id: WaiterId,
        elem: T,
    },
    // zero-capacity only: elem is buffered, and the send resolves once a receiver has taken it,
    // that is, once taken reaches the given value.
    Handoff {
        taken: u64,
    },
    // resolved or cancelled.
    Done,
}

impl<T> Send<T> {
    // poll the future. internally locks the queue. panics if already resolved or cancelled.
    pub(crate) fn poll(&mut self, cx: &mut Context) -> Poll<()> {
        let shared = &*self.shared;
        let mut lock = shared.lock();
        match mem::replace(&mut self.state, SendState::Done) {
            SendState::Waiting { id, elem } => {
                if !lock.send_waiters.is_front(id) || !lock.has_room(shared.cap) {
                    // either backpressure or this future isn't at the front of the wait queue
                    lock.send_waiters.register(id, cx.waker());
                    self.state = SendState::Waiting { id, elem };
                    return Poll::Pending;
                }

                let linked = lock.send_waiters.remove(id);
                debug_assert!(linked, "sending waiter was not linked");
                lock.elems.push_back(elem);
                shared.sync_len(&lock);

                if shared.cap == 0 {
                    // our elem is now the only buffered elem, so it is the next one taken
                    debug_assert_eq!(lock.elems.len(), 1);
                    let taken = lock.taken + 1;
                    lock.handoff = Some(cx.waker().clone());
                    lock.notify(shared.cap);
                    self.state = SendState::Handoff { taken };
                    return Poll::Pending;
                }

                lock.notify(shared.cap);
                Poll::Ready(())
            }
            SendState::Handoff { taken } => {
                if lock.taken >= taken {
                    return Poll::Ready(());
                }
                lock.handoff = Some(cx.waker().clone());
                self.state = SendState::Handoff { taken };
                Poll::Pending
            }
            SendState::Done => panic!("send future polled after already resolved or cancelled"),
        }
    }

    // if not already resolved or cancelled, cancel the future and return the elem.
    //
    // a zero-capacity send cancelled mid-handoff retracts its elem unless a receiver already took
    // it, in which case this returns none. never panics.
    pub(crate) fn cancel(&mut self) -> Option<T> {
        let shared = &*self.shared;
        match mem::replace(&mut self.state, SendState::Done) {
            SendState::Waiting { id, elem } => {
                let mut lock = shared.lock();
                let linked = lock.send_waiters.remove(id);
                debug_assert!(linked, "cancelled send waiter was not linked");
                lock.notify(shared.cap);
                Some(elem)
            }
            SendState::Handoff { taken } => {
                let mut lock = shared.lock();
                if lock.taken >= taken {
                    return None;
                }
                debug_assert_eq!(lock.elems.len(), 1);
                lock.handoff = None;
                let elem = lock.elems.pop_front();
                shared.sync_len(&lock);
                lock.notify(shared.cap);
                elem
            }
            SendState::Done => None,
        }
    }

    // whether the future has already resolved or cancelled.
    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self.state, SendState::Done)
    }
}

impl<T> Drop for Send<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

// recv future. internally locks the queue when dropped.
pub(crate) struct Recv<T> {
    shared: Arc<Shared<T>>,
    // some while linked into the recv wait queue.
    id: Option<WaiterId>,
}

impl<T> Recv<T> {
    // poll the future. internally locks the queue. panics if already resolved or cancelled.
    pub(crate) fn poll(&mut self, cx: &mut Context) -> Poll<T> {
        let id = self.id.expect("recv future polled after already resolved or cancelled");
        let shared = &*self.shared;
        let mut lock = shared.lock();

        let elem = if lock.recv_waiters.is_front(id) { lock.elems.pop_front() } else { None };
        let Some(elem) = elem else {
            lock.recv_waiters.register(id, cx.waker());
            return Poll::Pending;
        };

        let linked = lock.recv_waiters.remove(id);
        debug_assert!(linked, "receiving waiter was not linked");
        self.id = None;
        lock.taken += 1;
        if let Some(waker) = lock.handoff.take() {
            waker.wake();
        }
        shared.sync_len(&lock);
        lock.notify(shared.cap);
        Poll::Ready(elem)
    }

    // if not already resolved or cancelled, cancel the future. never panics.
    pub(crate) fn cancel(&mut self) {
        if let Some(id) = self.id.take() {
            let mut lock = self.shared.lock();
            let linked = lock.recv_waiters.remove(id);
            debug_assert!(linked, "cancelled recv waiter was not linked");
            lock.notify(self.shared.cap);
        }
    }

    // whether the future has already resolved or cancelled.
    pub(crate) fn is_terminated(&self) -> bool {
        self.id.is_none()
    }
}

impl<T> Drop for Recv<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;
    use std::{
        sync::atomic::{AtomicUsize, Ordering::SeqCst},
        task::Wake,
    };

    struct CountWakes(AtomicUsize);

    impl Wake for CountWakes {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, SeqCst);
        }
    }

    fn new_rng() -> Pcg32 {
        Pcg32::seed_from_u64(0xdeadbeef)
    }

    fn elems<T: Clone>(queue: &Queue<T>) -> Vec<T> {
        queue.0.lock().elems.iter().cloned().collect()
    }

    fn round<T>(queue: &Queue<T>, rng: &mut Pcg32) -> Poll<Round> {
        let count = Arc::new(CountWakes(AtomicUsize::new(0)));
        let waker = Waker::from(count);
        queue.poll_round(&mut Context::from_waker(&waker), rng)
    }

    fn send_now<T>(queue: &Queue<T>, elem: T) {
        let waker = Waker::from(Arc::new(CountWakes(AtomicUsize::new(0))));
        let mut send = queue.send(elem);
        assert_eq!(send.poll(&mut Context::from_waker(&waker)), Poll::Ready(()));
    }

    #[test]
    fn round_pends_on_empty_buffer_and_wakes_on_send() {
        let queue = Queue::new(4);
        let mut rng = new_rng();
        let count = Arc::new(CountWakes(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&count));
        assert_eq!(
            queue.poll_round(&mut Context::from_waker(&waker), &mut rng),
            Poll::Pending,
        );
        assert_eq!(count.0.load(SeqCst), 0);

        send_now(&queue, 1);
        assert_eq!(count.0.load(SeqCst), 1);
        assert_eq!(round(&queue, &mut rng), Poll::Ready(Round::Single));
        assert_eq!(elems(&queue), vec![1]);
        assert_eq!(queue.rounds(), 1);
    }

    #[test]
    fn rounds_relocate_without_touching_len() {
        let queue = Queue::new(8);
        for i in 1..=5 {
            send_now(&queue, i);
        }
        let mut rng = new_rng();
        let mut swapped = 0;
        for _ in 0..100 {
            let before = elems(&queue);
            match round(&queue, &mut rng) {
                Poll::Ready(Round::Swapped) => {
                    swapped += 1;
                    let mut expect = before[2..].to_vec();
                    expect.extend([before[1], before[0]]);
                    assert_eq!(elems(&queue), expect);
                }
                Poll::Ready(Round::Kept) => {
                    let mut expect = before[2..].to_vec();
                    expect.extend([before[0], before[1]]);
                    assert_eq!(elems(&queue), expect);
                }
                other => panic!("unexpected round outcome {:?}", other),
            }
            assert_eq!(queue.len(), 5);
        }
        assert!(swapped > 0 && swapped < 100);

        let mut sorted = elems(&queue);
        sorted.sort();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn stopped_shuffler_runs_no_rounds() {
        let queue = Queue::new(4);
        send_now(&queue, 1);
        send_now(&queue, 2);
        assert!(queue.stop_shuffler());
        assert!(!queue.stop_shuffler());
        assert!(!queue.is_shuffling());

        let mut rng = new_rng();
        assert_eq!(round(&queue, &mut rng), Poll::Ready(Round::Stopped));
        assert_eq!(queue.rounds(), 0);
        assert_eq!(elems(&queue), vec![1, 2]);
    }

    #[test]
    fn stop_wakes_parked_shuffler() {
        let queue = Queue::<u32>::new(4);
        let count = Arc::new(CountWakes(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&count));
        let mut cx = Context::from_waker(&waker);
        assert_eq!(queue.poll_stopped(&mut cx), Poll::Pending);
        queue.stop_shuffler();
        assert_eq!(count.0.load(SeqCst), 1);
        assert_eq!(queue.poll_stopped(&mut cx), Poll::Ready(()));
    }

    #[test]
    fn sends_do_not_interrupt_pause() {
        let queue = Queue::new(4);
        let round_count = Arc::new(CountWakes(AtomicUsize::new(0)));
        let round_waker = Waker::from(Arc::clone(&round_count));
        let stop_count = Arc::new(CountWakes(AtomicUsize::new(0)));
        let stop_waker = Waker::from(Arc::clone(&stop_count));
        let mut rng = new_rng();

        assert_eq!(
            queue.poll_round(&mut Context::from_waker(&round_waker), &mut rng),
            Poll::Pending,
        );
        assert_eq!(queue.poll_stopped(&mut Context::from_waker(&stop_waker)), Poll::Pending);

        send_now(&queue, 1);
        send_now(&queue, 2);
        let waker = Waker::from(Arc::new(CountWakes(AtomicUsize::new(0))));
        let mut recv = queue.recv();
        assert_eq!(recv.poll(&mut Context::from_waker(&waker)), Poll::Ready(1));
        assert_eq!(round_count.0.load(SeqCst), 1);
        assert_eq!(stop_count.0.load(SeqCst), 0);

        queue.stop_shuffler();
        assert_eq!(stop_count.0.load(SeqCst), 1);
    }

    #[test]
    fn send_respects_capacity_and_wait_order() {
        let queue = Queue::new(1);
        let waker = Waker::from(Arc::new(CountWakes(AtomicUsize::new(0))));
        let mut cx = Context::from_waker(&waker);

        let mut first = queue.send(1);
        let mut second = queue.send(2);
        // second is not at the front, even though there is room
        assert_eq!(second.poll(&mut cx), Poll::Pending);
        assert_eq!(first.poll(&mut cx), Poll::Ready(()));
        assert_eq!(queue.len(), 1);
        // now at the front, but full
        assert_eq!(second.poll(&mut cx), Poll::Pending);

        let mut recv = queue.recv();
        assert_eq!(recv.poll(&mut cx), Poll::Ready(1));
        assert_eq!(queue.len(), 0);
        assert_eq!(second.poll(&mut cx), Poll::Ready(()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn cancelled_send_returns_elem_and_unblocks_next() {
        let queue = Queue::new(4);
        let count = Arc::new(CountWakes(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&count));
        let mut cx = Context::from_waker(&waker);

        let mut first = queue.send("a");
        let mut second = queue.send("b");
        assert_eq!(second.poll(&mut cx), Poll::Pending);
        assert_eq!(first.cancel(), Some("a"));
        assert!(first.is_terminated());
        assert_eq!(count.0.load(SeqCst), 1);
        assert_eq!(second.poll(&mut cx), Poll::Ready(()));
        assert_eq!(elems(&queue), vec!["b"]);
    }

    #[test]
    fn zero_capacity_send_resolves_only_once_taken() {
        let queue = Queue::new(0);
        let count = Arc::new(CountWakes(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&count));
        let mut cx = Context::from_waker(&waker);

        let mut send = queue.send(5);
        let mut other = queue.send(6);
        assert_eq!(send.poll(&mut cx), Poll::Pending);
        assert_eq!(queue.len(), 0);
        assert_eq!(send.poll(&mut cx), Poll::Pending);
        // a single handoff at a time
        assert_eq!(other.poll(&mut cx), Poll::Pending);

        let mut recv = queue.recv();
        assert_eq!(recv.poll(&mut cx), Poll::Ready(5));
        assert_eq!(send.poll(&mut cx), Poll::Ready(()));
        assert_eq!(other.poll(&mut cx), Poll::Pending);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn zero_capacity_cancel_retracts_elem() {
        let queue = Queue::new(0);
        let waker = Waker::from(Arc::new(CountWakes(AtomicUsize::new(0))));
        let mut cx = Context::from_waker(&waker);

        let mut send = queue.send(5);
        assert_eq!(send.poll(&mut cx), Poll::Pending);
        assert_eq!(send.cancel(), Some(5));
        assert!(elems(&queue).is_empty());

        let mut recv = queue.recv();
        assert_eq!(recv.poll(&mut cx), Poll::Pending);
    }

    #[test]
    fn recv_waiters_take_turns() {
        let queue = Queue::new(4);
        let waker = Waker::from(Arc::new(CountWakes(AtomicUsize::new(0))));
        let mut cx = Context::from_waker(&waker);
        let mut first = queue.recv();
        let mut second = queue.recv();
        send_now(&queue, 1);
        assert_eq!(second.poll(&mut cx), Poll::Pending);
        first.cancel();
        assert_eq!(second.poll(&mut cx), Poll::Ready(1));
        assert!(second.is_terminated());
    }
}
