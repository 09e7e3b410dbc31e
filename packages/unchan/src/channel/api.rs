// exposed API of unordered queues

use self::future::*;
use super::{
    builder::Builder,
    core,
    shuffle::ShufflerHandle,
};
use std::{
    fmt::{self, Debug, Formatter},
    sync::Mutex,
};


/// Bounded queue which deliberately does not preserve the order of its elements
///
/// Behaves like a bounded blocking queue: sending waits while the queue is at capacity, and
/// receiving waits while it is empty. Meanwhile, a background shuffler keeps moving pairs of
/// buffered elements to the back of the queue, randomly swapping them, so elements come out in a
/// different order than they went in. Every element sent is received exactly once.
///
/// A capacity of 0 makes every send a rendezvous: the send completes once a receiver took its
/// element.
///
/// The shuffler runs until the queue is disposed of, either explicitly with
/// [`dispose`](Self::dispose) or by dropping the queue. Share the queue between threads by
/// reference (for example with [`std::thread::scope`]) or behind an `Arc`.
///
/// ```
/// let queue = unchan::UnorderedQueue::new(4);
/// for i in 0..4 {
///     queue.send(i).block();
/// }
/// let mut received = (0..4).map(|_| queue.recv().block()).collect::<Vec<_>>();
/// received.sort();
/// assert_eq!(received, vec![0, 1, 2, 3]);
/// ```
pub struct UnorderedQueue<T> {
    queue: core::Queue<T>,
    // taken upon disposal.
    shuffler: Mutex<Option<ShufflerHandle>>,
}

impl<T: Send + 'static> UnorderedQueue<T> {
    /// Create a queue with the given capacity, with its shuffler on a dedicated thread
    ///
    /// See [`Builder`] for other shuffler settings.
    ///
    /// # Panics
    ///
    /// Panics if the OS fails to create a thread, like [`std::thread::spawn`]. Use
    /// [`Builder::build`] to handle that case.
    pub fn new(capacity: usize) -> Self {
        Builder::new(capacity).build().expect("failed to spawn shuffler thread")
    }
}

impl<T> UnorderedQueue<T> {
    pub(crate) fn from_parts(queue: core::Queue<T>, shuffler: ShufflerHandle) -> Self {
        UnorderedQueue {
            queue,
            shuffler: Mutex::new(Some(shuffler)),
        }
    }

    /// Create a future to send a message into this queue
    ///
    /// See the API of [`SendFut`], as it is not only a future, but also provides the blocking
    /// [`block`](SendFut::block) method.
    pub fn send(&self, msg: T) -> SendFut<T> {
        SendFut(self.queue.send(msg))
    }

    /// Create a future to receive a message from this queue
    ///
    /// Which of the buffered messages is received is unspecified. See the API of [`RecvFut`], as
    /// it is not only a future, but also provides the blocking [`block`](RecvFut::block) method.
    pub fn recv(&self) -> RecvFut<T> {
        RecvFut(self.queue.recv())
    }

    /// Number of messages the queue currently holds
    ///
    /// This is a snapshot which may already be stale when it is returned if other threads are
    /// using the queue. The shuffler never affects it. Always 0 for a zero-capacity queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether [`len`](Self::len) is 0
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of messages the queue holds, fixed at construction
    pub fn cap(&self) -> usize {
        self.queue.cap()
    }

    /// Number of shuffle rounds performed so far
    pub fn shuffle_rounds(&self) -> u64 {
        self.queue.rounds()
    }

    /// Whether the shuffler is still running
    ///
    /// False once the queue has been disposed of, or if the shuffler died from a panic.
    pub fn is_shuffling(&self) -> bool {
        self.queue.is_shuffling()
    }

    /// Stop the background shuffler
    ///
    /// Once this returns, no further reordering occurs. Buffered messages remain receivable, and
    /// sending and receiving keep working, in plain FIFO order from then on. Calling this more
    /// than once has no further effect. Dropping the queue calls this.
    pub fn dispose(&self) {
        if self.queue.stop_shuffler() {
            debug!(rounds = self.queue.rounds(), "disposed of queue");
        }
        let handle = self.shuffler.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.join();
        }
    }
}

impl<T> Drop for UnorderedQueue<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T> Debug for UnorderedQueue<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("UnorderedQueue")
            .field("len", &self.len())
            .field("cap", &self.cap())
            .field("is_shuffling", &self.is_shuffling())
            .finish()
    }
}


// future types for queues.
pub(crate) mod future {
    use super::core;
    use crate::{
        channel::park::{block_on, Timeout},
        error::WouldBlockError,
    };
    use std::{
        task::{Poll, Context},
        future::{Future, poll_fn},
        pin::Pin,
    };

    /// Future for sending into an [`UnorderedQueue`](crate::UnorderedQueue)
    ///
    /// The message will not be sent until this future resolves (a call to `poll` returns
    /// `Poll::Ready`). If this future has not yet resolved, the send operation may be aborted and
    /// its message retrieved by calling [`rescind`](Self::rescind) (or by dropping).
    ///
    /// Send futures resolve in the order they were created. Thus, if one creates a send future
    /// and holds it for an extended period, it may block send futures created after it.
    ///
    /// For a zero-capacity queue, the message is handed over once this future is first polled
    /// with no other handoff in progress, and the future resolves once a receiver has taken it.
    pub struct SendFut<T>(pub(super) core::Send<T>);

    // the message is never pinned.
    impl<T> Unpin for SendFut<T> {}

    impl<T> Future for SendFut<T> {
        type Output = ();

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            if this.is_terminated() {
                return Poll::Pending;
            }
            this.0.poll(cx)
        }
    }

    impl<T> SendFut<T> {
        /// Block until this future resolves
        ///
        /// Waits for as long as it takes for room to free up. This method will panic if this
        /// future has already resolved or rescinded.
        pub fn block(mut self) {
            assert!(!self.is_terminated(), "SendFut.block called after terminated");
            block_on(&mut poll_fn(|cx| self.0.poll(cx)), Timeout::Never)
                .expect("poll timed out with Timeout::Never")
        }

        /// If the message has not yet been sent, abort the send operation and rescind the message
        ///
        /// Returns `Some` if this future has not yet resolved or rescinded. For a zero-capacity
        /// queue, a message already handed over is taken back unless a receiver already took it.
        pub fn rescind(&mut self) -> Option<T> {
            self.0.cancel()
        }

        /// Whether this future has already resolved or rescinded
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }
    }

    #[cfg(feature = "futures")]
    impl<T> futures::future::FusedFuture for SendFut<T> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }


    /// Future for receiving from an [`UnorderedQueue`](crate::UnorderedQueue)
    ///
    /// A message will not be dequeued from the queue until this future resolves (a call to
    /// `poll` returns `Poll::Ready`). If this future has not yet resolved, the receive operation
    /// may be aborted by calling [`abort`](Self::abort) (or by dropping).
    ///
    /// Receive futures resolve in the order they were created. Thus, if one creates a receive
    /// future and holds it for an extended period, it may block receive futures created after it.
    pub struct RecvFut<T>(pub(super) core::Recv<T>);

    impl<T> Future for RecvFut<T> {
        type Output = T;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<T> {
            let this = self.get_mut();
            // for implementation of FusedFuture
            if this.is_terminated() {
                return Poll::Pending;
            }
            this.0.poll(cx)
        }
    }

    impl<T> RecvFut<T> {
        /// Block until this future resolves
        ///
        /// Waits for as long as it takes for a message to arrive, which is forever if nothing is
        /// ever sent. This method will panic if this future has already resolved or aborted.
        pub fn block(mut self) -> T {
            assert!(!self.is_terminated(), "RecvFut.block called after terminated");
            block_on(&mut poll_fn(|cx| self.0.poll(cx)), Timeout::Never)
                .expect("poll timed out with Timeout::Never")
        }

        /// Try to receive a message immediately without blocking
        ///
        /// Fails if the queue is empty, or if other receive operations created earlier are still
        /// waiting. This method will panic if this future has already resolved or aborted.
        pub fn try_now(mut self) -> Result<T, WouldBlockError> {
            assert!(!self.is_terminated(), "RecvFut.try_now called after terminated");
            block_on(&mut poll_fn(|cx| self.0.poll(cx)), Timeout::NonBlocking)
                .ok_or(WouldBlockError)
        }

        /// Abort this receive operation
        ///
        /// Does nothing if this future has already resolved or aborted. This method never panics.
        pub fn abort(&mut self) {
            self.0.cancel();
        }

        /// Whether this future has already resolved or aborted
        pub fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }
    }

    #[cfg(feature = "futures")]
    impl<T> futures::future::FusedFuture for RecvFut<T> {
        fn is_terminated(&self) -> bool {
            Self::is_terminated(self)
        }
    }
}


// ==== tests ====
