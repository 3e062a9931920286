//! Routing of events to registered handlers.
//!
//! The reader task never runs handler code. It pushes events into a bounded
//! queue; a single dispatcher task pops them in wire order, calls each
//! matching handler and spawns the returned future into a [`JoinSet`] gated
//! by a semaphore. Handler panics are caught and counted.

use crate::{
    constants::{EVENT_ALL, EVENT_CUSTOM},
    event::EslEvent,
};
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, trace, warn};

/// Future returned by an [`EventHandler`].
pub type HandlerFuture = BoxFuture<'static, ()>;

/// Callback invoked for each matching event.
///
/// The synchronous part runs on the dispatcher task in wire order; the
/// returned future runs concurrently with other handlers.
pub type EventHandler = Arc<dyn Fn(EslEvent) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`].
///
/// ```
/// use freeswitch_esl_session::{handler_fn, HandlerRegistry};
///
/// let registry = HandlerRegistry::new().on(
///     "CHANNEL_ANSWER",
///     handler_fn(|event| async move {
///         println!("answered: {:?}", event.unique_id());
///     }),
/// );
/// assert!(registry.handles("CHANNEL_ANSWER"));
/// ```
pub fn handler_fn<F, Fut>(f: F) -> EventHandler
where
    F: Fn(EslEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Event name → handlers. Fixed once a session is built.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Vec<EventHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self
            .names()
            .collect();
        f.debug_struct("HandlerRegistry")
            .field("events", &names)
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_name` (builder style).
    ///
    /// `event_name` is an `Event-Name` such as `CHANNEL_ANSWER`, `ALL` for a
    /// blanket subscription, or `CUSTOM <subclass>` for custom events.
    pub fn on(mut self, event_name: impl Into<String>, handler: EventHandler) -> Self {
        self.add(event_name, handler);
        self
    }

    /// Register `handler` for `event_name`.
    pub fn add(&mut self, event_name: impl Into<String>, handler: EventHandler) {
        self.handlers
            .entry(event_name.into())
            .or_default()
            .push(handler);
    }

    /// Registered event names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers
            .keys()
            .map(String::as_str)
    }

    /// `true` if some handler is registered under exactly `name`.
    pub fn handles(&self, name: &str) -> bool {
        self.handlers
            .contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers
            .is_empty()
    }

    /// Handlers for an event: its routing key first, then plain `CUSTOM`
    /// for custom events with an unregistered subclass, then `ALL`.
    fn resolve(&self, event: &EslEvent) -> &[EventHandler] {
        let key = event.routing_key();
        if let Some(handlers) = self
            .handlers
            .get(key.as_ref())
        {
            return handlers;
        }
        if event.name() == EVENT_CUSTOM {
            if let Some(handlers) = self
                .handlers
                .get(EVENT_CUSTOM)
            {
                return handlers;
            }
        }
        match self
            .handlers
            .get(EVENT_ALL)
        {
            Some(handlers) => handlers,
            None => &[],
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct DispatchStats {
    dropped: AtomicU64,
    failures: AtomicU64,
}

impl DispatchStats {
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
            .load(Ordering::Relaxed)
    }

    pub(crate) fn failures(&self) -> u64 {
        self.failures
            .load(Ordering::Relaxed)
    }
}

/// Reader-side handle to the dispatcher task.
pub(crate) struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    tx: mpsc::Sender<EslEvent>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Start the dispatcher task.
    pub(crate) fn spawn(
        registry: Arc<HandlerRegistry>,
        queue_size: usize,
        max_concurrent: usize,
        stats: Arc<DispatchStats>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let task = tokio::spawn(run(rx, registry.clone(), semaphore, stats.clone()));
        (
            Self {
                registry,
                tx,
                stats,
            },
            task,
        )
    }

    /// Queue an event body for its handlers without waiting for them.
    ///
    /// Bodies without `Event-Name` and events nobody handles are dropped
    /// silently. Returns `false` once the dispatcher task is gone.
    pub(crate) fn dispatch(&self, body: String, conn_id: usize) -> bool {
        let Some(event) = EslEvent::from_body(body, conn_id) else {
            trace!("[DISPATCH] body without Event-Name, dropping");
            return true;
        };
        if self
            .registry
            .resolve(&event)
            .is_empty()
        {
            trace!("[DISPATCH] no handler for {}", event.routing_key());
            return true;
        }

        match self
            .tx
            .try_send(event)
        {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.stats
                    .dropped
                    .fetch_add(1, Ordering::Relaxed);
                warn!("Event queue full, dropping {}", event.name());
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

async fn run(
    mut rx: mpsc::Receiver<EslEvent>,
    registry: Arc<HandlerRegistry>,
    semaphore: Arc<Semaphore>,
    stats: Arc<DispatchStats>,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                reap(result, &stats);
            }
            next = rx.recv() => {
                let Some(event) = next else { break };
                for handler in registry.resolve(&event) {
                    let Ok(permit) = semaphore
                        .clone()
                        .acquire_owned()
                        .await
                    else {
                        return;
                    };
                    let started = std::panic::catch_unwind(AssertUnwindSafe(|| {
                        handler(event.clone())
                    }));
                    match started {
                        Ok(fut) => {
                            tasks.spawn(async move {
                                let _permit = permit;
                                fut.await;
                            });
                        }
                        Err(_) => {
                            error!("handler for {} panicked", event.name());
                            stats
                                .failures
                                .fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }
    }

    debug!(
        "[DISPATCH] queue closed, waiting for {} running handler(s)",
        tasks.len()
    );
    while let Some(result) = tasks
        .join_next()
        .await
    {
        reap(result, &stats);
    }
}

fn reap(result: Result<(), JoinError>, stats: &DispatchStats) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("event handler panicked: {}", e);
        } else {
            warn!("event handler aborted: {}", e);
        }
        stats
            .failures
            .fetch_add(1, Ordering::Relaxed);
    }
}
