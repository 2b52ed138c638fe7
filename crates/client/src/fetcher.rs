//! Request descriptors and the fetcher that binds one to a view.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cell::{LoadingCell, LoadingState};
use crate::error::ClientError;

/// Debounce window applied to input changes unless configured otherwise.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

pub type OperationFuture<T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'static>>;

type Operation<T> = Arc<dyn Fn() -> OperationFuture<T> + Send + Sync>;
type SuccessSink<T> = Arc<dyn Fn(&T) + Send + Sync>;
type FailureSink = Arc<dyn Fn(&ClientError) -> FailureAction + Send + Sync>;

/// What a failed fetch does to the last published value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureAction {
    #[default]
    Keep,
    Clear,
}

/// How to obtain one value: the operation plus optional sinks.
pub struct RequestDescriptor<T> {
    operation: Operation<T>,
    on_success: Option<SuccessSink<T>>,
    on_failure: Option<FailureSink>,
}

impl<T> Clone for RequestDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            operation: Arc::clone(&self.operation),
            on_success: self.on_success.clone(),
            on_failure: self.on_failure.clone(),
        }
    }
}

impl<T: Send + 'static> RequestDescriptor<T> {
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        Self {
            operation: Arc::new(move || Box::pin(operation()) as OperationFuture<T>),
            on_success: None,
            on_failure: None,
        }
    }

    /// An operation whose raw response is reshaped before publication.
    ///
    /// A transform error surfaces as `ClientError::Processing`.
    pub fn with_transform<R, F, Fut, X>(operation: F, transform: X) -> Self
    where
        R: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ClientError>> + Send + 'static,
        X: Fn(R) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);
        Self::new(move || {
            let raw = operation();
            let transform = Arc::clone(&transform);
            async move {
                let raw = raw.await?;
                transform(raw).map_err(|e| ClientError::Processing(format!("{e:#}")))
            }
        })
    }

    pub fn on_success(mut self, sink: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(sink));
        self
    }

    pub fn on_failure(
        mut self,
        sink: impl Fn(&ClientError) -> FailureAction + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Arc::new(sink));
        self
    }
}

/// State shared between a fetcher handle and its background tasks.
pub(crate) struct Shared<T> {
    cell: LoadingCell,
    result: watch::Sender<Option<T>>,
    descriptor: Mutex<RequestDescriptor<T>>,
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    fn new(descriptor: RequestDescriptor<T>) -> Arc<Self> {
        let (result, _) = watch::channel(None);
        Arc::new(Self {
            cell: LoadingCell::new(),
            result,
            descriptor: Mutex::new(descriptor),
        })
    }

    fn descriptor(&self) -> RequestDescriptor<T> {
        self.descriptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_descriptor(&self, descriptor: RequestDescriptor<T>) {
        *self.descriptor.lock().unwrap_or_else(PoisonError::into_inner) = descriptor;
    }

    pub(crate) async fn fetch(&self) -> Result<T, ClientError> {
        let descriptor = self.descriptor();
        let ticket = self.cell.track();
        let seq = ticket.seq();
        debug!(seq, "dispatching fetch");

        let outcome = (descriptor.operation)().await;

        if !ticket.settle(outcome.as_ref().err()) {
            debug!(seq, "discarding stale completion");
            return outcome;
        }

        match &outcome {
            Ok(value) => {
                self.result.send_replace(Some(value.clone()));
                if let Some(sink) = &descriptor.on_success {
                    sink(value);
                }
            }
            Err(e) => {
                warn!(seq, "fetch failed: {e}");
                let action = descriptor
                    .on_failure
                    .as_ref()
                    .map(|sink| sink(e))
                    .unwrap_or_default();
                if action == FailureAction::Clear {
                    self.result.send_replace(None);
                }
            }
        }
        outcome
    }

    /// Dispatches a fetch that outlives the caller.
    pub(crate) fn spawn_fetch(self: &Arc<Self>) -> JoinHandle<()> {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let _ = shared.fetch().await;
        })
    }

    pub(crate) fn cell(&self) -> &LoadingCell {
        &self.cell
    }

    pub(crate) fn result(&self) -> Option<T> {
        self.result.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.result.subscribe()
    }
}

/// Binds a request descriptor to observable loading, error and result state.
pub struct ReactiveFetcher<T> {
    shared: Arc<Shared<T>>,
    trigger: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + Sync + 'static> ReactiveFetcher<T> {
    /// A fetcher that only fetches when asked.
    pub fn new(descriptor: RequestDescriptor<T>) -> Self {
        Self {
            shared: Shared::new(descriptor),
            trigger: None,
        }
    }

    /// Fetches immediately, then again once `input` has been quiet for `window`.
    ///
    /// The descriptor is re-derived from the latest input value before each fetch.
    /// Must be called within a tokio runtime.
    pub fn watching<I, D>(mut input: watch::Receiver<I>, derive: D, window: Duration) -> Self
    where
        I: Send + Sync + 'static,
        D: Fn(&I) -> RequestDescriptor<T> + Send + Sync + 'static,
    {
        let initial = {
            let current = input.borrow_and_update();
            derive(&*current)
        };
        let shared = Shared::new(initial);
        shared.spawn_fetch();

        let tasks = Arc::clone(&shared);
        let trigger = tokio::spawn(async move {
            while input.changed().await.is_ok() {
                // Restart the quiet period on every change.
                loop {
                    tokio::select! {
                        changed = input.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(window) => break,
                    }
                }
                let descriptor = {
                    let current = input.borrow_and_update();
                    derive(&*current)
                };
                tasks.replace_descriptor(descriptor);
                tasks.spawn_fetch();
            }
            debug!("input closed; stopping automatic fetches");
        });

        Self {
            shared,
            trigger: Some(trigger),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared<T>> {
        &self.shared
    }

    /// Runs the current descriptor and returns this call's own outcome.
    pub async fn fetch(&self) -> Result<T, ClientError> {
        self.shared.fetch().await
    }

    /// The last applied value, if any.
    pub fn result(&self) -> Option<T> {
        self.shared.result()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.shared.subscribe()
    }

    pub fn loading_state(&self) -> LoadingState {
        self.shared.cell().state()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<LoadingState> {
        self.shared.cell().subscribe()
    }

    /// The view's loading cell, for ad-hoc operations that share its state.
    pub fn cell(&self) -> &LoadingCell {
        self.shared.cell()
    }

    /// Stops automatic fetches. Fetches already dispatched still complete.
    pub fn unsubscribe(&mut self) {
        if let Some(trigger) = self.trigger.take() {
            trigger.abort();
        }
    }
}

impl<T> Drop for ReactiveFetcher<T> {
    fn drop(&mut self) {
        if let Some(trigger) = self.trigger.take() {
            trigger.abort();
        }
    }
}
