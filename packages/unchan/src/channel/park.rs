// blocking on queue futures from synchronous code.
//
// design based on pollster crate. the waker is an Arc'd mutex + condvar, so a waker that outlives
// the call to block_on (such as one still installed in a wait queue after a timeout) only keeps
// the signal allocation alive.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Condvar, Mutex},
    task::{Context, Poll, Wake, Waker},
    time::Instant,
};


// timeout for blocking on a future.
#[derive(Debug, Copy, Clone)]
pub(crate) enum Timeout {
    // never time out.
    Never,
    // time out at the given deadline.
    At(Instant),
    // time out if the future cannot be resolved without blocking.
    NonBlocking,
}

// poll the future until it resolves, or return none if the timeout is reached first.
//
// the future is left unresolved on timeout. it is up to the caller to cancel or drop it.
pub(crate) fn block_on<F>(fut: &mut F, timeout: Timeout) -> Option<F::Output>
where
    F: Future + Unpin,
{
    let signal = Arc::new(Signal {
        state: Mutex::new(State::Empty),
        cond: Condvar::new(),
    });
    let waker = Waker::from(Arc::clone(&signal));
    let mut cx = Context::from_waker(&waker);

    loop {
        // return if ready
        if let Poll::Ready(output) = Pin::new(&mut *fut).poll(&mut cx) {
            return Some(output);
        }

        let mut lock = signal.state.lock().unwrap();

        // a wake that raced with the poll means we should poll again right away
        if let State::Notified = *lock {
            *lock = State::Empty;
            continue;
        }

        debug_assert!(matches!(*lock, State::Empty));
        *lock = State::Waiting;
        match timeout {
            Timeout::Never =>
                while let State::Waiting = *lock {
                    lock = signal.cond.wait(lock).unwrap();
                },
            Timeout::At(deadline) =>
                while let State::Waiting = *lock {
                    let Some(duration) = deadline.checked_duration_since(Instant::now())
                        else { return None };
                    let (lock2, wait_result) = signal.cond.wait_timeout(lock, duration).unwrap();
                    lock = lock2;
                    if wait_result.timed_out() && matches!(*lock, State::Waiting) {
                        return None;
                    }
                },
            Timeout::NonBlocking => return None,
        }
        *lock = State::Empty;
    }
}

// synchronization signal state
enum State {
    Empty,
    Waiting,
    Notified,
}

// synchronization signal
struct Signal {
    state: Mutex<State>,
    cond: Condvar,
}

impl Wake for Signal {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let mut lock = self.state.lock().unwrap();
        match *lock {
            State::Notified => (),
            State::Empty => *lock = State::Notified,
            State::Waiting => {
                *lock = State::Empty;
                self.cond.notify_one();
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        future::{pending, poll_fn, ready},
        sync::atomic::{AtomicBool, Ordering::SeqCst},
        thread,
        time::Duration,
    };

    #[test]
    fn ready_future_resolves_under_every_timeout() {
        assert_eq!(block_on(&mut ready(1), Timeout::Never), Some(1));
        assert_eq!(block_on(&mut ready(2), Timeout::NonBlocking), Some(2));
        let deadline = Instant::now() + Duration::from_millis(10);
        assert_eq!(block_on(&mut ready(3), Timeout::At(deadline)), Some(3));
    }

    #[test]
    fn pending_future_times_out() {
        assert_eq!(block_on(&mut pending::<()>(), Timeout::NonBlocking), None);

        let start = Instant::now();
        let deadline = start + Duration::from_millis(30);
        assert_eq!(block_on(&mut pending::<()>(), Timeout::At(deadline)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn woken_from_another_thread() {
        let flag = Arc::new(AtomicBool::new(false));
        let waker_slot = Arc::new(Mutex::new(None::<Waker>));

        let join = {
            let flag = Arc::clone(&flag);
            let waker_slot = Arc::clone(&waker_slot);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                flag.store(true, SeqCst);
                if let Some(waker) = waker_slot.lock().unwrap().take() {
                    waker.wake();
                }
            })
        };

        let mut fut = poll_fn(|cx| {
            let mut slot = waker_slot.lock().unwrap();
            if flag.load(SeqCst) {
                Poll::Ready(7)
            } else {
                *slot = Some(cx.waker().clone());
                Poll::Pending
            }
        });
        assert_eq!(block_on(&mut fut, Timeout::Never), Some(7));
        join.join().unwrap();
    }
}
