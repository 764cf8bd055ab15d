//! Execution bridge between callers and the tool-server runtime.
//!
//! Every server session is driven from one long-lived tokio runtime owned by
//! a dedicated thread. Callers hand futures to it over a `flume` channel and
//! wait for the result, either with `.await` ([`Bridge::execute`]) or by
//! blocking ([`Bridge::execute_blocking`]). Both go through the same
//! submission path, so the result does not depend on the calling context.
//!
//! ```text
//! ┌──────────────────┐   flume: jobs →    ┌────────────────────┐
//! │ caller (sync or  │ ─────────────────► │ skiff-bridge       │
//! │ any runtime)     │ ◄───────────────── │ tokio runtime      │
//! └──────────────────┘   ← result         │ server pipes live  │
//!                                         └────────────────────┘
//! ```

use std::future::Future;
use std::pin::Pin;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

/// Default bound on how long a submitted job may run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra time a blocked caller waits past the job's own deadline.
const REPLY_GRACE: Duration = Duration::from_secs(1);

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Errors from the execution bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("execution timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("execution bridge is shut down")]
    Closed,

    #[error("failed to start execution bridge: {0}")]
    Start(#[from] std::io::Error),
}

/// Handle to the bridge worker. Dropping it stops the worker.
pub struct Bridge {
    jobs: flume::Sender<Job>,
    timeout: Duration,
    _worker: thread::JoinHandle<()>,
}

impl Bridge {
    /// Start a bridge with the default timeout.
    pub fn new() -> Result<Self, BridgeError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Start a bridge whose jobs are cancelled after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, BridgeError> {
        let (jobs, queue) = flume::unbounded::<Job>();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("skiff-bridge-worker")
            .enable_all()
            .build()?;

        let worker = thread::Builder::new()
            .name("skiff-bridge".into())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Ok(job) = queue.recv_async().await {
                        tokio::spawn(job);
                    }
                });
                debug!("bridge worker stopped");
            })?;

        Ok(Self {
            jobs,
            timeout,
            _worker: worker,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `fut` on the bridge runtime and await its result.
    pub async fn execute<F, T>(&self, fut: F) -> Result<T, BridgeError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.execute_with_timeout(fut, self.timeout).await
    }

    pub async fn execute_with_timeout<F, T>(&self, fut: F, timeout: Duration) -> Result<T, BridgeError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let reply = self.submit(fut, timeout)?;
        reply.recv_async().await.map_err(|_| BridgeError::Closed)?
    }

    /// Run `fut` on the bridge runtime and block the current thread until it
    /// finishes.
    ///
    /// Safe to call from plain threads and from inside a tokio runtime; it
    /// never starts a runtime on the calling thread.
    ///
    /// `fut` is first polled on the bridge runtime, so it must be lazy: build
    /// timers and I/O inside an `async` block, not before the call.
    pub fn execute_blocking<F, T>(&self, fut: F) -> Result<T, BridgeError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.execute_blocking_with_timeout(fut, self.timeout)
    }

    pub fn execute_blocking_with_timeout<F, T>(&self, fut: F, timeout: Duration) -> Result<T, BridgeError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let reply = self.submit(fut, timeout)?;
        let wait = move || match reply.recv_timeout(timeout + REPLY_GRACE) {
            Ok(result) => result,
            Err(flume::RecvTimeoutError::Timeout) => Err(BridgeError::Timeout(timeout)),
            Err(flume::RecvTimeoutError::Disconnected) => Err(BridgeError::Closed),
        };

        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(wait)
            }
            _ => wait(),
        }
    }

    fn submit<F, T>(
        &self,
        fut: F,
        timeout: Duration,
    ) -> Result<flume::Receiver<Result<T, BridgeError>>, BridgeError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = flume::bounded(1);
        let job: Job = Box::pin(async move {
            let outcome = tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| BridgeError::Timeout(timeout));
            let _ = reply_tx.send(outcome);
        });
        self.jobs.send(job).map_err(|_| BridgeError::Closed)?;
        Ok(reply_rx)
    }
}
