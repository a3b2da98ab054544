use super::pending::{CallControl, CallState};
use super::RequestError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Handle to the result of an outstanding request
///
/// Resolves exactly once, either with the decoded response or with an error. Dropping the handle
/// does not abort the request, it will still be cleaned up once a response arrives or the
/// timeout expires.
pub struct CallFuture<T> {
    receiver: oneshot::Receiver<Result<T, RequestError>>,
    call: Arc<dyn CallControl>,
}

impl<T> CallFuture<T> {
    pub(super) fn new(
        receiver: oneshot::Receiver<Result<T, RequestError>>,
        call: Arc<dyn CallControl>,
    ) -> Self {
        Self { receiver, call }
    }

    /// Correlation id the request has been sent with
    pub fn correlation_id(&self) -> &str {
        self.call.correlation_id()
    }

    /// Current lifecycle state of the request
    pub fn state(&self) -> CallState {
        self.call.state()
    }

    /// Aborts the request, resolving it with [`RequestError::Cancelled`]
    ///
    /// Returns `false` if the request had already been resolved.
    pub async fn cancel(&self) -> bool {
        self.call.cancel().await
    }
}

impl<T> Future for CallFuture<T> {
    type Output = Result<T, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RequestError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
