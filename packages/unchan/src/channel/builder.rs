// configuration for constructing a queue.

use super::{
    api::UnorderedQueue,
    core::Queue,
    error::BuildError,
    shuffle::{ShuffleConfig, ShufflerHandle},
};
use rand::SeedableRng;
use rand_pcg::Pcg32;
use std::{
    panic,
    time::Duration,
};


/// Default pause between two shuffle rounds
pub const DEFAULT_SHUFFLE_INTERVAL: Duration = Duration::from_micros(50);

/// Default name of the shuffler thread
pub const DEFAULT_THREAD_NAME: &str = "unchan-shuffler";

/// Builder for an [`UnorderedQueue`] with non-default shuffler settings
///
/// ```
/// use std::time::Duration;
///
/// let queue = unchan::Builder::new(16)
///     .shuffle_interval(Duration::from_micros(10))
///     .seed(42)
///     .build::<u32>()
///     .unwrap();
/// queue.send(1).block();
/// assert_eq!(queue.recv().block(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    capacity: usize,
    shuffle_interval: Duration,
    seed: Option<u64>,
    thread_name: String,
}

impl Builder {
    /// Start configuring a queue with the given capacity
    pub fn new(capacity: usize) -> Self {
        Builder {
            capacity,
            shuffle_interval: DEFAULT_SHUFFLE_INTERVAL,
            seed: None,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }

    /// Set how long the shuffler pauses between two rounds
    ///
    /// The shuffler only runs rounds while the queue holds elements, so this mostly trades CPU
    /// time against how thoroughly buffered elements get mixed. Defaults to
    /// [`DEFAULT_SHUFFLE_INTERVAL`].
    pub fn shuffle_interval(mut self, interval: Duration) -> Self {
        self.shuffle_interval = interval;
        self
    }

    /// Seed the shuffler's random number generator
    ///
    /// Unseeded queues draw a seed from [`rand::random`].
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the name of the shuffler thread, when the shuffler runs on its own thread
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Build the queue, running its shuffler on a dedicated OS thread
    pub fn build<T>(self) -> Result<UnorderedQueue<T>, BuildError>
    where
        T: Send + 'static,
    {
        let queue = Queue::new(self.capacity);
        let config = self.shuffle_config();
        let handle = ShufflerHandle::spawn_thread(queue.clone(), config, self.thread_name)?;
        debug!(capacity = self.capacity, "spawned shuffler thread");
        Ok(UnorderedQueue::from_parts(queue, handle))
    }

    /// Build the queue, running its shuffler as a task on the current tokio runtime
    ///
    /// Fails with [`BuildError::NoRuntime`] if called outside the context of a tokio runtime, or
    /// with [`BuildError::NoTimeDriver`] if that runtime has its time driver disabled.
    pub fn build_tokio<T>(self) -> Result<UnorderedQueue<T>, BuildError>
    where
        T: Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()?;
        // tokio offers no query for this, but creating a sleep panics without timers
        if panic::catch_unwind(|| drop(tokio::time::sleep(Duration::ZERO))).is_err() {
            return Err(BuildError::NoTimeDriver);
        }
        let queue = Queue::new(self.capacity);
        let handle = ShufflerHandle::spawn_task(queue.clone(), self.shuffle_config(), &runtime);
        debug!(capacity = self.capacity, "spawned shuffler task");
        Ok(UnorderedQueue::from_parts(queue, handle))
    }

    fn shuffle_config(&self) -> ShuffleConfig {
        let seed = self.seed.unwrap_or_else(rand::random);
        ShuffleConfig {
            interval: self.shuffle_interval,
            rng: Pcg32::seed_from_u64(seed),
        }
    }
}
