// implementation of the unordered queue.
//
// the basic architecture is the same as a mutex-based channel:
//
// queue handles wrap around Arc<shared state>
//                              |
//          /-------------------/
//          v
//       shared state
//          |
//          |------ a Mutex around the lockable state, which contains a VecDeque<T> of buffered
//          |       elements, a wait queue of pending send futures and another of pending recv
//          |       futures. only the future at the front of its wait queue may complete, which
//          |       makes waiters fair amongst themselves.
//          |
//          \------ atomics for the logical length and the shuffle round count, so they can be
//                  read without locking.
//
// the shuffler is one more party contending for the mutex. each round it moves the front one or
// two elements to the back, swapped half of the time, without ever unlocking in between.
//
// blocking versions of operations are built as a layer on top of the futures, in the park module.
//
// the organization of these modules is as such:
//
//      wait_queue<--------core: the lockable state and the futures operating on it. presents an
//                         ^ ^   abstraction which is safe but panicky and inconvenient.
//                         | |
//      park<----------shuffle: drives the shuffle rounds from a thread or a tokio task.
//       ^                 ^ |
//       |                 | |
//       \-------------builder: configuration, spawns the shuffler.
//       |                   |
//       \-----------------api: a wrapper around core that adapts it into an API that is
//                              convenient and defensive. the crate re-exports this API publicly.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publicly.

pub(crate) mod error;
pub(crate) mod api;
pub(crate) mod builder;

mod wait_queue;
mod park;
mod shuffle;
mod core;
