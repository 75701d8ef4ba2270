use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{DrainPolicy, WorkerConfig};
use crate::domain::WorkerState;
use crate::error::{HandlerError, SpindleError};
use crate::handler::Handler;
use crate::queue::WorkQueue;
use crate::request::{Outcome, Request, Ticket};
use crate::stats::{Counters, WorkerStats};

/// The request type a worker running `H` consumes.
pub type WorkRequest<H> = Request<<H as Handler>::Input, <H as Handler>::Output>;

/// Single consumer of a [`WorkQueue`].
///
/// - `start()` で消費ループを spawn する（呼び出し側はブロックしない）
/// - `stop()` で queue を close し、ループの終了を待つ
/// - 一度 `Stopped` になった worker は再起動できない
/// - `stop()` せずに drop すると queue を close し、ループも止める
///   （queue に残っていた request の ticket は `Abandoned` になる）
pub struct Worker<H: Handler> {
    queue: Arc<WorkQueue<WorkRequest<H>>>,
    handler: Arc<H>,
    policy: DrainPolicy,
    state: Arc<watch::Sender<WorkerState>>,
    counters: Arc<Counters>,
    halt: CancellationToken,
}

impl<H: Handler> Worker<H> {
    /// Worker over a queue that may already be shared with producers.
    pub fn new(queue: Arc<WorkQueue<WorkRequest<H>>>, handler: H) -> Self {
        Self::with_policy(queue, handler, DrainPolicy::default())
    }

    pub fn with_policy(
        queue: Arc<WorkQueue<WorkRequest<H>>>,
        handler: H,
        policy: DrainPolicy,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            queue,
            handler: Arc::new(handler),
            policy,
            state: Arc::new(state),
            counters: Arc::new(Counters::default()),
            halt: CancellationToken::new(),
        }
    }

    /// Build the queue from `config` and attach a worker to it.
    ///
    /// # Errors
    /// [`SpindleError::InvalidCapacity`] when the configured capacity is zero.
    pub fn from_config(handler: H, config: &WorkerConfig) -> Result<Self, SpindleError> {
        config.validate()?;
        let queue = Arc::new(WorkQueue::new(config.capacity)?);
        Ok(Self::with_policy(queue, handler, config.drain_policy))
    }

    pub fn queue(&self) -> &Arc<WorkQueue<WorkRequest<H>>> {
        &self.queue
    }

    pub fn policy(&self) -> DrainPolicy {
        self.policy
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot(self.state(), self.queue.len())
    }

    /// Spawn the consumer loop onto the current tokio runtime.
    ///
    /// Cancelling `cancel` makes the loop exit at its next wait on the queue.
    /// Requests still queued at that point are left unfulfilled; their
    /// producers only get an answer if someone drains or drops the queue.
    ///
    /// # Errors
    /// [`SpindleError::InvalidState`] unless the worker is `Idle`.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn start(&self, cancel: CancellationToken) -> Result<(), SpindleError> {
        let current = self.transition(WorkerState::Idle, WorkerState::Running);
        if current != WorkerState::Idle {
            return Err(SpindleError::InvalidState {
                op: "start",
                state: current,
            });
        }

        self.counters.mark_started();
        let worker_loop = WorkerLoop {
            queue: Arc::clone(&self.queue),
            handler: Arc::clone(&self.handler),
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
            cancel,
            halt: self.halt.clone(),
        };
        tokio::spawn(worker_loop.run());

        tracing::info!(capacity = self.queue.capacity(), policy = ?self.policy, "worker started");
        Ok(())
    }

    /// Stop with a bounded wait. See [`Worker::stop_until`].
    pub async fn stop(&self, timeout: Duration) -> Result<(), SpindleError> {
        self.stop_until(tokio::time::sleep(timeout)).await
    }

    /// Close the queue and wait until the loop has exited, or until
    /// `deadline` completes.
    ///
    /// Concurrent callers all wait on the same shutdown. Calling this on an
    /// already stopped worker returns `Ok` right away.
    ///
    /// # Errors
    /// - [`SpindleError::InvalidState`] if the worker was never started.
    /// - [`SpindleError::ShutdownTimedOut`] if `deadline` fires first. The
    ///   loop keeps running in the background and still reaches `Stopped`.
    pub async fn stop_until<F>(&self, deadline: F) -> Result<(), SpindleError>
    where
        F: Future<Output = ()>,
    {
        let previous = self.transition(WorkerState::Running, WorkerState::Stopping);
        match previous {
            WorkerState::Idle => {
                return Err(SpindleError::InvalidState {
                    op: "stop",
                    state: previous,
                });
            }
            WorkerState::Running => {
                tracing::info!(pending = self.queue.len(), policy = ?self.policy, "stopping worker");
            }
            WorkerState::Stopping | WorkerState::Stopped => {}
        }

        self.queue.close();
        if self.policy == DrainPolicy::Abandon {
            self.abandon_pending();
        }

        let stopped = wait_until_stopped(self.state.subscribe());
        tokio::select! {
            () = stopped => Ok(()),
            () = deadline => {
                tracing::warn!(pending = self.queue.len(), "worker did not stop before the deadline");
                Err(SpindleError::ShutdownTimedOut)
            }
        }
    }

    /// Enqueue `payload` (suspending while the queue is full) and return
    /// the ticket to wait on.
    ///
    /// # Errors
    /// [`SpindleError::QueueClosed`] once the worker is stopping.
    pub async fn submit(&self, payload: H::Input) -> Result<Ticket<H::Output>, SpindleError> {
        let (request, ticket) = Request::new(payload);
        tracing::debug!(request = %request.id(), "submitting request");
        self.queue.enqueue(request).await?;
        Ok(ticket)
    }

    /// Like [`Worker::submit`] but rejects with `QueueFull` instead of
    /// suspending.
    pub fn try_submit(&self, payload: H::Input) -> Result<Ticket<H::Output>, SpindleError> {
        let (request, ticket) = Request::new(payload);
        self.queue.try_enqueue(request)?;
        Ok(ticket)
    }

    /// Submit and wait for the result in one call.
    pub async fn call(&self, payload: H::Input) -> Outcome<H::Output> {
        self.submit(payload).await?.wait().await
    }

    /// Compare-and-set on the state. Returns the state seen before the call.
    fn transition(&self, from: WorkerState, to: WorkerState) -> WorkerState {
        let mut seen = from;
        self.state.send_if_modified(|state| {
            seen = *state;
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        seen
    }

    fn abandon_pending(&self) {
        let dropped = self.queue.drain_pending();
        if dropped.is_empty() {
            return;
        }
        self.counters.record_abandoned(dropped.len());
        tracing::warn!(count = dropped.len(), "abandoning queued requests");
        // drop で各 ticket に Abandoned が届く
        drop(dropped);
    }
}

impl<H: Handler> Drop for Worker<H> {
    fn drop(&mut self) {
        if !self.state().is_active() {
            return;
        }
        self.halt.cancel();
        self.queue.close();
        let dropped = self.queue.drain_pending();
        if !dropped.is_empty() {
            self.counters.record_abandoned(dropped.len());
            tracing::warn!(count = dropped.len(), "worker dropped without stop, abandoning queued requests");
        }
    }
}

impl<H: Handler> std::fmt::Debug for Worker<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("state", &self.state())
            .field("policy", &self.policy)
            .field("queue", &self.queue)
            .finish()
    }
}

async fn wait_until_stopped(mut rx: watch::Receiver<WorkerState>) {
    loop {
        if rx.borrow_and_update().is_terminal() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Everything the spawned loop needs, detached from the `Worker` handle.
struct WorkerLoop<H: Handler> {
    queue: Arc<WorkQueue<WorkRequest<H>>>,
    handler: Arc<H>,
    state: Arc<watch::Sender<WorkerState>>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    /// Cancelled when the owning `Worker` is dropped.
    halt: CancellationToken,
}

impl<H: Handler> WorkerLoop<H> {
    async fn run(self) {
        let _exit = ExitGuard {
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
        };

        loop {
            // dequeue は待つ可能性があるので cancel と競合させる（cancel 優先）
            let request = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::warn!(
                        pending = self.queue.len(),
                        "worker cancelled, queued requests left unfulfilled"
                    );
                    break;
                }
                () = self.halt.cancelled() => {
                    tracing::debug!("worker handle dropped");
                    break;
                }
                next = self.queue.dequeue() => match next {
                    Ok(request) => request,
                    Err(_) => {
                        tracing::debug!("queue closed and drained");
                        break;
                    }
                },
            };

            self.process(request).await;
        }
    }

    async fn process(&self, request: WorkRequest<H>) {
        let id = request.id();
        let (payload, completion) = request.into_parts();

        let outcome = match AssertUnwindSafe(self.handler.handle(payload))
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => {
                self.counters.record_success();
                tracing::debug!(request = %id, "request processed");
                Ok(output)
            }
            Ok(Err(err)) => {
                self.counters.record_failure();
                tracing::warn!(request = %id, error = %err, "handler failed");
                Err(err.into())
            }
            Err(panic) => {
                self.counters.record_failure();
                let err = HandlerError::new(panic_message(panic.as_ref()));
                tracing::error!(request = %id, error = %err, "handler panicked");
                Err(err.into())
            }
        };

        let fulfilled = completion.fulfill(outcome);
        debug_assert!(fulfilled.is_ok(), "request {id} was fulfilled twice");
        if let Err(err) = fulfilled {
            tracing::error!(request = %id, error = %err, "completion already fulfilled");
        }
    }
}

/// Publishes `Stopped` however the loop ends.
struct ExitGuard {
    state: Arc<watch::Sender<WorkerState>>,
    counters: Arc<Counters>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.counters.mark_stopped();
        self.state.send_replace(WorkerState::Stopped);
        tracing::info!("worker stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}
