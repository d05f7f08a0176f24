//! In-process publish/subscribe event bus.
//!
//! Handlers subscribe by subject string (§6.1) and are dispatched in
//! subscription order; each dispatch runs as an independent spawned task so
//! a slow or erroring handler never blocks its siblings or the publisher.
//! An exception inside a handler is caught and re-published once as
//! `error.occurred` — errors raised while handling `error.occurred` itself
//! are logged only, which is what keeps a bad handler from cascading into
//! an infinite storm of derived error events.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{subjects, Event, EventPayload, ErrorOccurred};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;
pub type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// How long [`EventBus::shutdown`] waits for in-flight handlers before
/// cancelling the stragglers.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

struct Inner {
    handlers: HashMap<String, Vec<Handler>>,
    active_tasks: Vec<JoinHandle<()>>,
}

/// A connection-scoped event bus. Cheaply cloneable — clones share the same
/// handler table and in-flight task bookkeeping.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                handlers: HashMap::new(),
                active_tasks: Vec::new(),
            })),
        }
    }

    /// Register `handler` for `subject`. Handlers for the same subject are
    /// dispatched in the order they were subscribed.
    pub fn subscribe(&self, subject: &str, handler: Handler) {
        self.inner
            .lock()
            .handlers
            .entry(subject.to_string())
            .or_default()
            .push(handler);
    }

    /// Convenience wrapper for an `async fn(Event) -> anyhow::Result<()>`-shaped closure.
    pub fn subscribe_fn<F, Fut>(&self, subject: &str, f: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.subscribe(subject, Arc::new(move |e| Box::pin(f(e))));
    }

    /// Publish `event` to every handler subscribed to its subject.
    ///
    /// Each handler runs in its own spawned task. If `wait` is true this
    /// call resolves only after every handler for this publish has
    /// finished; otherwise it returns as soon as the tasks are scheduled.
    /// Returns `true` unless the bus has no record of ever being usable
    /// (in practice this always succeeds — failure is reserved for future
    /// transport-backed buses).
    pub async fn publish(&self, event: Event, wait: bool) -> bool {
        let subject = event.subject();
        let handlers = {
            let mut inner = self.inner.lock();
            inner.active_tasks.retain(|h| !h.is_finished());
            inner.handlers.get(subject).cloned().unwrap_or_default()
        };

        if handlers.is_empty() {
            debug!(subject, "publish: no subscribers");
            return true;
        }

        let mut joins = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let bus = self.clone();
            let ev = event.clone();
            let subject_owned = subject.to_string();
            let join = tokio::spawn(async move {
                if let Err(err) = handler(ev.clone()).await {
                    warn!(subject = %subject_owned, error = %err, "event handler failed");
                    bus.report_handler_error(&ev, err).await;
                }
            });
            joins.push(join);
        }

        if wait {
            for j in &mut joins {
                let _ = j.await;
            }
        } else {
            self.inner.lock().active_tasks.extend(joins);
        }

        true
    }

    /// Convenience: build and publish an event from a payload in one call.
    pub async fn emit(&self, payload: EventPayload, wait: bool) -> bool {
        self.publish(Event::new(payload), wait).await
    }

    async fn report_handler_error(&self, source: &Event, err: anyhow::Error) {
        if source.subject() == subjects::ERROR_OCCURRED {
            // No cascade: a failure while handling an error event is logged only.
            warn!(error = %err, "error.occurred handler itself failed");
            return;
        }
        let payload = EventPayload::ErrorOccurred(ErrorOccurred {
            error_type: "event_handler_error".to_string(),
            message: err.to_string(),
        });
        // Fire-and-forget: awaiting here would serialize error delivery
        // behind whatever task is currently reporting this failure.
        self.emit(payload, false).await;
    }

    /// Wait up to `timeout` for in-flight handlers to finish, then abort
    /// the rest and drop all subscriptions. After this call no further
    /// handler invocation from a prior `publish` can occur (invariant 5).
    pub async fn shutdown(&self, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_GRACE);
        let tasks = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut inner.active_tasks)
        };

        let join_all = async {
            for t in tasks {
                let _ = t.await;
            }
        };

        if tokio::time::timeout(timeout, join_all).await.is_err() {
            warn!("event bus shutdown: grace period elapsed, handlers may have been cancelled");
        }

        let mut inner = self.inner.lock();
        inner.handlers.clear();
        inner.active_tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AsrResult, EventPayload};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    fn final_event() -> Event {
        Event::new(EventPayload::AsrResultFinal(AsrResult {
            text: "hi".into(),
            confidence: 0.85,
            is_final: true,
        }))
    }

    #[tokio::test]
    async fn dispatches_to_all_subscribers_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            bus.subscribe_fn(subjects::ASR_RESULT_FINAL, move |_e| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().push(tag);
                    Ok(())
                }
            });
        }

        bus.publish(final_event(), true).await;
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn handler_error_is_reported_once_not_cascaded() {
        let bus = EventBus::new();
        let error_count = Arc::new(AtomicUsize::new(0));

        bus.subscribe_fn(subjects::ASR_RESULT_FINAL, |_e| async {
            Err(anyhow::anyhow!("boom"))
        });
        {
            let error_count = Arc::clone(&error_count);
            bus.subscribe_fn(subjects::ERROR_OCCURRED, move |_e| {
                let error_count = Arc::clone(&error_count);
                async move {
                    error_count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        bus.publish(final_event(), true).await;
        // the failing handler's error report is fire-and-forget; give it a tick
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(error_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_clears_subscribers() {
        let bus = EventBus::new();
        let called = Arc::new(AtomicUsize::new(0));
        {
            let called = Arc::clone(&called);
            bus.subscribe_fn(subjects::ASR_RESULT_FINAL, move |_e| {
                let called = Arc::clone(&called);
                async move {
                    called.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        bus.shutdown(Some(StdDuration::from_millis(50))).await;
        bus.publish(final_event(), true).await;
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }
}
