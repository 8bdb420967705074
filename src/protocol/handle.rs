use super::types::{StateCell, TaskState};
use crate::error::TaskError;
use crate::membership::types::NodeId;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Completion handle returned by `submit`.
///
/// Resolves to the original task instance once the result has been merged
/// into it and `on_ack` has run. Awaiting the handle is the only point where
/// a caller blocks on a remote call.
pub struct TaskHandle<T> {
    target: NodeId,
    state: StateCell,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

// Never pin-projected; the receiver is polled through `Pin::new`.
impl<T> Unpin for TaskHandle<T> {}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        target: NodeId,
        state: StateCell,
        rx: oneshot::Receiver<Result<T, TaskError>>,
    ) -> Self {
        Self { target, state, rx }
    }

    pub fn target(&self) -> &NodeId {
        &self.target
    }

    /// Current originator-side protocol state.
    pub fn state(&self) -> TaskState {
        self.state.get()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::Shutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}
