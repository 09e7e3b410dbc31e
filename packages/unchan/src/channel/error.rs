// queue error types.
//
// the core operations of a queue never fail. these only cover the non-blocking and construction
// surfaces.

use std::io;
use tokio::runtime::TryCurrentError;


/// Error for attempting to use a queue without blocking, and the operation not completing
/// immediately
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, thiserror::Error)]
#[error("operation would block")]
pub struct WouldBlockError;

/// Error for failing to start a queue's background shuffler
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The OS refused to spawn the shuffler thread
    #[error("failed to spawn shuffler thread: {0}")]
    SpawnThread(#[from] io::Error),
    /// A tokio-driven shuffler was requested outside the context of a tokio runtime
    #[error("no tokio runtime to spawn shuffler task on: {0}")]
    NoRuntime(#[from] TryCurrentError),
    /// A tokio-driven shuffler was requested on a runtime built without its time driver
    #[error("tokio runtime has timers disabled, enable them with Builder::enable_time")]
    NoTimeDriver,
}
