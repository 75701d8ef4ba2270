//! Request - payload と完了スロットの組
//!
//! A [`Request`] travels through the queue to the worker, which fulfills its
//! [`Completion`] exactly once. The producer keeps the paired [`Ticket`] and
//! waits on it for the result.
//!
//! # Single observer
//! `Ticket::wait` consumes the ticket, so only one place can observe a
//! result. Handing the ticket to another task is the caller's business.

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::domain::RequestId;
use crate::error::SpindleError;

/// What a producer eventually observes for one request.
pub type Outcome<R> = Result<R, SpindleError>;

/// A unit of work: an immutable payload plus the slot its result goes into.
pub struct Request<P, R> {
    id: RequestId,
    payload: P,
    completion: Completion<R>,
}

impl<P, R> Request<P, R> {
    /// Create a request and the ticket the producer waits on.
    pub fn new(payload: P) -> (Self, Ticket<R>) {
        let id = RequestId::generate();
        let (tx, rx) = oneshot::channel();
        let request = Self {
            id,
            payload,
            completion: Completion {
                id,
                slot: Mutex::new(Some(tx)),
            },
        };
        (request, Ticket { id, rx })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn completion(&self) -> &Completion<R> {
        &self.completion
    }

    /// Split into the payload (for the handler) and the completion (for the
    /// result).
    pub fn into_parts(self) -> (P, Completion<R>) {
        (self.payload, self.completion)
    }
}

impl<P: std::fmt::Debug, R> std::fmt::Debug for Request<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .field("fulfilled", &self.completion.is_fulfilled())
            .finish()
    }
}

/// Single-assignment result slot, written by the worker.
///
/// Dropping an unfulfilled completion resolves the ticket with
/// [`SpindleError::Abandoned`].
pub struct Completion<R> {
    id: RequestId,
    slot: Mutex<Option<oneshot::Sender<Outcome<R>>>>,
}

impl<R> Completion<R> {
    /// Deliver the outcome and wake the waiting producer. Never blocks.
    ///
    /// # Errors
    /// [`SpindleError::DoubleFulfillment`] if this slot was already written.
    pub fn fulfill(&self, outcome: Outcome<R>) -> Result<(), SpindleError> {
        let Some(tx) = self.slot.lock().take() else {
            return Err(SpindleError::DoubleFulfillment);
        };

        // ticket が先に drop されていても worker 側のエラーではない
        if tx.send(outcome).is_err() {
            tracing::debug!(request = %self.id, "ticket dropped before fulfillment");
        }
        Ok(())
    }

    pub fn is_fulfilled(&self) -> bool {
        self.slot.lock().is_none()
    }

    pub fn request_id(&self) -> RequestId {
        self.id
    }
}

/// Producer-side handle for the result of one request.
#[derive(Debug)]
pub struct Ticket<R> {
    id: RequestId,
    rx: oneshot::Receiver<Outcome<R>>,
}

impl<R> Ticket<R> {
    pub fn request_id(&self) -> RequestId {
        self.id
    }

    /// Suspend until the worker fulfills the request.
    pub async fn wait(self) -> Outcome<R> {
        self.rx.await.unwrap_or(Err(SpindleError::Abandoned))
    }

    /// Blocking variant of [`Ticket::wait`] for code outside the runtime.
    ///
    /// # Panics
    /// Panics when called from inside an async execution context.
    pub fn blocking_wait(self) -> Outcome<R> {
        self.rx.blocking_recv().unwrap_or(Err(SpindleError::Abandoned))
    }

    /// Poll without suspending. `None` means not fulfilled yet.
    ///
    /// The outcome is handed out once; later calls report `Abandoned`.
    pub fn try_result(&mut self) -> Option<Outcome<R>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(SpindleError::Abandoned)),
        }
    }
}
