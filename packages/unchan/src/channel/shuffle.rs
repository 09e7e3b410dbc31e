// background shuffler which perturbs the order of buffered elems.
//
// the shuffler repeats rounds (see core::Queue::poll_round) until it is stopped, pausing for the
// configured interval between rounds. it can be driven either by its own OS thread, which blocks
// using the park module, or by a task on a tokio runtime.

use super::{
    core::{Queue, Round},
    park::{block_on, Timeout},
};
use rand_pcg::Pcg32;
use std::{
    future::poll_fn,
    io,
    thread,
    time::{Duration, Instant},
};


// shuffler parameters, resolved from the builder.
pub(crate) struct ShuffleConfig {
    pub(crate) interval: Duration,
    pub(crate) rng: Pcg32,
}

// handle to a running shuffler.
pub(crate) enum ShufflerHandle {
    Thread(thread::JoinHandle<()>),
    Task(tokio::task::JoinHandle<()>),
}

impl ShufflerHandle {
    // spawn the shuffler on a new OS thread.
    pub(crate) fn spawn_thread<T>(
        queue: Queue<T>,
        config: ShuffleConfig,
        name: String,
    ) -> io::Result<Self>
    where
        T: Send + 'static,
    {
        thread::Builder::new()
            .name(name)
            .spawn(move || run_blocking(queue, config))
            .map(ShufflerHandle::Thread)
    }

    // spawn the shuffler as a task on the given tokio runtime.
    pub(crate) fn spawn_task<T>(
        queue: Queue<T>,
        config: ShuffleConfig,
        runtime: &tokio::runtime::Handle,
    ) -> Self
    where
        T: Send + 'static,
    {
        ShufflerHandle::Task(runtime.spawn(run_async(queue, config)))
    }

    // wait for the thread to exit, or abort the task.
    //
    // must only be called after the shuffler was stopped, or joining a thread may never return.
    pub(crate) fn join(self) {
        match self {
            ShufflerHandle::Thread(handle) => {
                if handle.join().is_err() {
                    error!("shuffler thread panicked");
                }
            }
            ShufflerHandle::Task(mut handle) => {
                if handle.is_finished() {
                    let result = block_on(&mut handle, Timeout::NonBlocking);
                    if let Some(Err(e)) = result {
                        if e.is_panic() {
                            error!("shuffler task panicked");
                        }
                    }
                } else {
                    // the task notices the stop on its own, unless it was never polled again
                    handle.abort();
                }
            }
        }
    }
}

// marks the shuffler stopped if its driver unwinds, so the queue does not keep claiming to
// shuffle.
struct StopOnPanic<T>(Queue<T>);

impl<T> Drop for StopOnPanic<T> {
    fn drop(&mut self) {
        if thread::panicking() && self.0.stop_shuffler() {
            warn!(rounds = self.0.rounds(), "shuffler stopped by panic");
        }
    }
}

// shuffler body for a dedicated thread.
fn run_blocking<T>(queue: Queue<T>, config: ShuffleConfig) {
    let ShuffleConfig { interval, mut rng } = config;
    let _guard = StopOnPanic(queue.clone());
    loop {
        let round = block_on(&mut poll_fn(|cx| queue.poll_round(cx, &mut rng)), Timeout::Never);
        match round {
            Some(Round::Stopped) | None => break,
            Some(round) => trace!(?round, "shuffle round"),
        }

        let deadline = Instant::now() + interval;
        if block_on(&mut poll_fn(|cx| queue.poll_stopped(cx)), Timeout::At(deadline)).is_some() {
            break;
        }
    }
    debug!(rounds = queue.rounds(), "shuffler thread stopped");
}

// shuffler body for a tokio task.
async fn run_async<T>(queue: Queue<T>, config: ShuffleConfig) {
    let ShuffleConfig { interval, mut rng } = config;
    let _guard = StopOnPanic(queue.clone());
    loop {
        match poll_fn(|cx| queue.poll_round(cx, &mut rng)).await {
            Round::Stopped => break,
            round => trace!(?round, "shuffle round"),
        }

        let stopped = poll_fn(|cx| queue.poll_stopped(cx));
        if tokio::time::timeout(interval, stopped).await.is_ok() {
            break;
        }
    }
    debug!(rounds = queue.rounds(), "shuffler task stopped");
}
