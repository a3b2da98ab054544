use super::super::broker::{Channel, ConsumerTag, Delivery};
use super::super::serializer::MessageSerializer;
use super::RequestError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

/// How a call has been resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// A correlated response has been decoded
    Response,
    /// No correlated response arrived in time
    Timeout,
    /// The call has been cancelled by the caller
    Cancelled,
    /// The call failed for any other reason
    Error,
}

/// Lifecycle of an outstanding call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Consumer is active, request not yet published
    Created,
    /// Request is being published
    Publishing,
    /// Request has been published, awaiting the response
    Waiting,
    /// Terminal state, entered exactly once
    Resolved(CallOutcome),
}

#[derive(Debug, Error)]
#[error("reply consumer stopped before a response arrived")]
struct ConsumerClosed;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set of reply queues currently awaited by outstanding calls
#[derive(Clone, Default)]
pub(super) struct ReplyQueueRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl ReplyQueueRegistry {
    /// Reserves the queue, returns `None` if another call is already waiting on it
    pub(super) fn lease(&self, queue: &str) -> Option<ReplyQueueLease> {
        if lock(&self.active).insert(queue.to_owned()) {
            Some(ReplyQueueLease {
                registry: self.clone(),
                queue: queue.to_owned(),
            })
        } else {
            None
        }
    }

    #[cfg(test)]
    pub(super) fn is_leased(&self, queue: &str) -> bool {
        lock(&self.active).contains(queue)
    }
}

/// Exclusive use of a reply queue, released on drop
pub(super) struct ReplyQueueLease {
    registry: ReplyQueueRegistry,
    queue: String,
}

impl Drop for ReplyQueueLease {
    fn drop(&mut self) {
        lock(&self.registry.active).remove(&self.queue);
    }
}

/// Right to write the result of a call, only ever handed out once
pub(super) struct Commit<T> {
    sender: oneshot::Sender<Result<T, RequestError>>,
    _lease: ReplyQueueLease,
}

/// Consumer on the reply queue which may be cancelled any number of times
pub(super) struct ConsumerHandle<C> {
    channel: Arc<C>,
    tag: ConsumerTag,
    cancelled: AtomicBool,
}

impl<C> ConsumerHandle<C>
where
    C: Channel + Send + Sync,
{
    pub(super) fn new(channel: Arc<C>, tag: ConsumerTag) -> Self {
        Self {
            channel,
            tag,
            cancelled: AtomicBool::new(false),
        }
    }

    pub(super) async fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.channel.cancel(&self.tag).await {
            warn!(consumer = %self.tag, "Failed to cancel reply consumer: {}", e);
        }
    }
}

/// One-shot timer which may be disposed any number of times
#[derive(Default)]
pub(super) struct TimerHandle {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TimerHandle {
    /// Stores the handle of the spawned timer, which can not release itself before that
    fn arm(&self, spawn: impl FnOnce() -> JoinHandle<()>) {
        let mut task = lock(&self.task);
        *task = Some(spawn());
    }

    /// Stops the timer if it is still running
    fn dispose(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }

    /// Releases the handle from within the firing timer without aborting it
    fn release(&self) {
        lock(&self.task).take();
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        lock(&self.task).is_some()
    }
}

/// Live state of one outstanding request
pub(super) struct PendingCall<C, T> {
    correlation_id: String,
    slot: Mutex<Option<Commit<T>>>,
    state: Mutex<CallState>,
    consumer: ConsumerHandle<C>,
    timer: TimerHandle,
}

impl<C, T> PendingCall<C, T>
where
    C: Channel + Send + Sync + 'static,
    T: Send + 'static,
{
    pub(super) fn new(
        correlation_id: String,
        consumer: ConsumerHandle<C>,
        lease: ReplyQueueLease,
    ) -> (Arc<Self>, oneshot::Receiver<Result<T, RequestError>>) {
        let (sender, receiver) = oneshot::channel();

        let call = Self {
            correlation_id,
            slot: Mutex::new(Some(Commit {
                sender,
                _lease: lease,
            })),
            state: Mutex::new(CallState::Created),
            consumer,
            timer: TimerHandle::default(),
        };

        (Arc::new(call), receiver)
    }

    /// Takes the right to resolve the call. Only the first caller receives it.
    fn claim(&self) -> Option<Commit<T>> {
        lock(&self.slot).take()
    }

    pub(super) fn is_resolved(&self) -> bool {
        matches!(*lock(&self.state), CallState::Resolved(_))
    }

    pub(super) fn transition(&self, next: CallState) {
        let mut state = lock(&self.state);

        if !matches!(*state, CallState::Resolved(_)) {
            *state = next;
        }
    }

    fn finish(&self, commit: Commit<T>, result: Result<T, RequestError>) {
        let outcome = match &result {
            Ok(_) => CallOutcome::Response,
            Err(RequestError::Timeout(_)) => CallOutcome::Timeout,
            Err(RequestError::Cancelled) => CallOutcome::Cancelled,
            Err(_) => CallOutcome::Error,
        };

        *lock(&self.state) = CallState::Resolved(outcome);
        debug!(correlation_id = %self.correlation_id, ?outcome, "Request resolved");

        // The reply queue is free again by the time the caller observes the result
        let Commit { sender, _lease: lease } = commit;
        drop(lease);

        // The caller may have stopped waiting, which is not an error on our side
        sender.send(result).ok();
    }

    /// Starts the timeout timer
    pub(super) fn arm_timer(self: &Arc<Self>, timeout: Duration) {
        let call = self.clone();

        self.timer.arm(move || {
            tokio::spawn(async move {
                sleep(timeout).await;
                call.expire(timeout).await;
            })
        });
    }

    async fn expire(&self, timeout: Duration) {
        if let Some(commit) = self.claim() {
            self.timer.release();
            self.consumer.cancel().await;
            self.finish(commit, Err(RequestError::Timeout(timeout)));
        }
    }

    /// Resolves the call with the given error after releasing consumer and timer
    ///
    /// Returns whether this invocation actually resolved the call.
    pub(super) async fn fail(&self, error: RequestError) -> bool {
        match self.claim() {
            Some(commit) => {
                self.timer.dispose();
                self.consumer.cancel().await;
                self.finish(commit, Err(error));
                true
            }
            None => false,
        }
    }

    /// Releases consumer and timer without handing a result to the waiting side
    ///
    /// Used when the error is reported to the caller directly. Returns `false` if the call had
    /// already been resolved, in which case the outcome is available through the receiver.
    pub(super) async fn withdraw(&self) -> bool {
        match self.claim() {
            Some(commit) => {
                self.timer.dispose();
                self.consumer.cancel().await;
                *lock(&self.state) = CallState::Resolved(CallOutcome::Error);
                drop(commit);
                true
            }
            None => false,
        }
    }

    /// Watches the deliveries on the reply queue for the correlated response
    pub(super) fn listen<S>(self: &Arc<Self>, mut deliveries: BoxStream<'static, Delivery>, serializer: Arc<S>)
    where
        S: MessageSerializer + Send + Sync + 'static,
        T: DeserializeOwned,
    {
        let call = self.clone();

        tokio::spawn(async move {
            while let Some(delivery) = deliveries.next().await {
                if call.respond(delivery, serializer.as_ref()).await {
                    return;
                }
            }

            call.fail(RequestError::Channel(Box::new(ConsumerClosed)))
                .await;
        });
    }

    /// Handles a single delivery, returns whether it was correlated with this call
    async fn respond<S>(&self, delivery: Delivery, serializer: &S) -> bool
    where
        S: MessageSerializer,
        T: DeserializeOwned,
    {
        if !delivery.properties.is_correlated_with(&self.correlation_id) {
            trace!(
                correlation_id = %self.correlation_id,
                received = ?delivery.properties.correlation_id,
                "Ignoring uncorrelated delivery"
            );
            return false;
        }

        if let Some(commit) = self.claim() {
            self.timer.dispose();

            let result = serializer
                .deserialize::<T>(&delivery.body)
                .map_err(RequestError::ResponseDeserialization);

            self.consumer.cancel().await;
            self.finish(commit, result);
        }

        true
    }
}

/// Type-erased control over a [`PendingCall`]
#[async_trait]
pub(super) trait CallControl: Send + Sync {
    fn correlation_id(&self) -> &str;

    fn state(&self) -> CallState;

    async fn cancel(&self) -> bool;
}

#[async_trait]
impl<C, T> CallControl for PendingCall<C, T>
where
    C: Channel + Send + Sync + 'static,
    T: Send + 'static,
{
    fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn state(&self) -> CallState {
        *lock(&self.state)
    }

    async fn cancel(&self) -> bool {
        self.fail(RequestError::Cancelled).await
    }
}
