//! Asset provider trait and subscription handle

use meshforge_core::{ForgeError, Result};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::job::{CreditBalance, Job, JobKind};
use crate::params::JobParams;

/// Callback receiving each freshly normalized job from a stream
pub type UpdateFn = Box<dyn FnMut(Job) + Send + 'static>;

/// Callback receiving stream errors
pub type ErrorFn = Box<dyn FnMut(ForgeError) + Send + 'static>;

/// Trait implemented by each backend (Meshy, Mock).
///
/// Every method is a fresh round trip; implementations keep no job registry.
pub trait AssetProvider: Send + Sync {
    /// Provider name (e.g. "meshy", "mock"), stamped on every job
    fn name(&self) -> &str;

    /// Read the current credit balance
    fn get_balance(&self) -> Result<CreditBalance>;

    /// Submit a job and return its initial state.
    ///
    /// Reads the balance once for `credits.before`, submits once, then fetches
    /// the new task once.
    fn create_job(&self, params: JobParams) -> Result<Job>;

    /// Fetch the current state of a job. The kind selects the endpoint, so
    /// `None` fails with `MissingKind`.
    fn get_job(&self, job_id: &str, kind: Option<JobKind>) -> Result<Job>;

    /// Subscribe to pushed updates for a job.
    ///
    /// Errors, including a missing kind, are delivered through `on_error`.
    /// The subscription closes itself after the first terminal update.
    fn stream_job(
        &self,
        job_id: &str,
        kind: Option<JobKind>,
        on_update: UpdateFn,
        on_error: ErrorFn,
    ) -> Subscription;

    /// Parse a kind name and raw arguments, then submit.
    ///
    /// Unknown kinds fail with `UnsupportedKind` before any network call.
    fn create_job_named(&self, kind: &str, args: serde_json::Value) -> Result<Job> {
        let params = JobParams::from_args(kind, args)?;
        self.create_job(params)
    }
}

/// Cancellation shared between a [`Subscription`] and its worker.
///
/// Callbacks run through [`StreamControl::deliver`], which holds a gate that
/// `unsubscribe` also takes, so a cancelled subscription never starts another
/// callback and `unsubscribe` returns only after an in-flight one finishes.
#[derive(Clone)]
pub struct StreamControl {
    cancel: CancellationToken,
    gate: Arc<Mutex<()>>,
}

impl StreamControl {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token handed to transports so a blocked read can end on cancellation
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `callback` unless the subscription was cancelled. Returns whether
    /// it ran.
    pub fn deliver(&self, callback: impl FnOnce()) -> bool {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cancel.is_cancelled() {
            return false;
        }
        callback();
        true
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Handle to a running stream subscription.
///
/// Dropping the handle detaches the worker; the connection stays open until
/// the backend reports a terminal status or the connection fails.
pub struct Subscription {
    control: StreamControl,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawn a worker that runs `body` until it returns or is cancelled
    pub(crate) fn spawn<F>(name: String, body: F) -> Self
    where
        F: FnOnce(StreamControl) + Send + 'static,
    {
        let control = StreamControl::new();
        let worker_control = control.clone();
        let worker = std::thread::Builder::new()
            .name(name)
            .spawn(move || body(worker_control));

        match worker {
            Ok(handle) => Self {
                control,
                worker: Some(handle),
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to spawn stream worker");
                control.cancel();
                Self {
                    control,
                    worker: None,
                }
            }
        }
    }

    /// A subscription that never delivers anything
    pub fn inactive() -> Self {
        let control = StreamControl::new();
        control.cancel();
        Self {
            control,
            worker: None,
        }
    }

    /// Stop the subscription and close its connection.
    ///
    /// No callback starts after this returns. A callback already running on
    /// another thread is waited for; calling this from inside a callback does
    /// not wait.
    pub fn unsubscribe(&self) {
        self.control.cancel();
        let on_worker = self
            .worker
            .as_ref()
            .is_some_and(|w| w.thread().id() == std::thread::current().id());
        if !on_worker {
            drop(self.control.gate.lock().unwrap_or_else(PoisonError::into_inner));
        }
    }

    /// Whether the worker is still running and has not been cancelled
    pub fn is_active(&self) -> bool {
        !self.control.is_cancelled() && self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Block until the worker exits
    pub fn wait(mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Stream worker panicked");
            }
        }
    }
}

/// Poll a job until it reaches a terminal status.
///
/// `on_poll` sees every observed state, including the terminal one. There is
/// no timeout; callers that need one should stream instead or bound the loop
/// themselves.
pub fn wait_for_job(
    provider: &dyn AssetProvider,
    job_id: &str,
    kind: JobKind,
    interval: Duration,
    mut on_poll: impl FnMut(&Job),
) -> Result<Job> {
    loop {
        let job = provider.get_job(job_id, Some(kind))?;
        on_poll(&job);
        if job.is_terminal() {
            return Ok(job);
        }
        std::thread::sleep(interval);
    }
}
