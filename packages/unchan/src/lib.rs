//! An unordered bounded queue.
//!
//! [`UnorderedQueue`] behaves like a bounded blocking queue, except that it deliberately does not
//! preserve first-in-first-out order: a background shuffler keeps perturbing the order of
//! buffered elements. This is useful wherever strict ordering is unnecessary or undesirable, such
//! as distributing load, testing fairness, or flushing out hidden dependencies on ordering.
//!
//! The reordering is best-effort and local. It is not a uniform random permutation. The only
//! guarantee is that every element sent is received exactly once.
//!
//! ```
//! use std::{sync::Arc, thread};
//!
//! let queue = Arc::new(unchan::UnorderedQueue::new(8));
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || {
//!         for i in 0..100 {
//!             queue.send(i).block();
//!         }
//!     })
//! };
//! let mut sum = 0;
//! for _ in 0..100 {
//!     sum += queue.recv().block();
//! }
//! producer.join().unwrap();
//! assert_eq!(sum, 4950);
//! ```

#[macro_use]
extern crate tracing;

mod channel;

pub use crate::channel::{
    api::*,
    builder::*,
};

/// Error types
pub mod error {
    pub use crate::channel::error::*;
}

/// Future types
pub mod future {
    pub use crate::channel::api::future::*;
}
