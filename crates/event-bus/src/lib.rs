//! Callback-registry event bus for execution-state notifications.
//!
//! Subscribers register async callbacks per event kind. `emit` fans out to
//! all callbacks concurrently and waits for every one of them, so event
//! delivery stays synchronous with respect to the control loop even though
//! subscriber execution is parallel. A failing or panicking subscriber is
//! logged and never aborts its siblings or the emitting caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::error;

use pagepilot_core_types::ExecutionEvent;

/// Channels carried on the bus. Only execution progress today; kept as an
/// enum so host integrations can add their own channels.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    Execution,
}

/// Error returned by a subscriber callback. Logged by the bus, never
/// propagated to the emitter.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SubscriberError(pub String);

type HandlerFn = dyn Fn(ExecutionEvent) -> BoxFuture<'static, Result<(), SubscriberError>>
    + Send
    + Sync;

/// A subscriber callback with pointer identity.
///
/// Identity matters for the subscribe/unsubscribe contract: registering the
/// same handler twice is a no-op, and unsubscribe removes by identity. Clone
/// the handler (cheap, it is an `Arc`) and keep it around if you intend to
/// unsubscribe later.
#[derive(Clone)]
pub struct EventHandler(Arc<HandlerFn>);

impl EventHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(ExecutionEvent) -> BoxFuture<'static, Result<(), SubscriberError>>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    fn same_as(&self, other: &EventHandler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventHandler({:p})", Arc::as_ptr(&self.0))
    }
}

/// In-process publish/subscribe channel for `ExecutionEvent`s.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<EventKind, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `kind`. Duplicate registration of the same
    /// handler is a no-op.
    pub fn subscribe(&self, kind: EventKind, handler: EventHandler) {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        let handlers = subscribers.entry(kind).or_default();
        if !handlers.iter().any(|h| h.same_as(&handler)) {
            handlers.push(handler);
        }
    }

    /// Remove a callback by identity. No-op if it was never registered.
    pub fn unsubscribe(&self, kind: EventKind, handler: &EventHandler) {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        if let Some(handlers) = subscribers.get_mut(&kind) {
            handlers.retain(|h| !h.same_as(handler));
        }
    }

    /// Drop every callback registered for `kind`.
    pub fn clear(&self, kind: EventKind) {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        subscribers.remove(&kind);
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        subscribers.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every subscriber of `kind`, concurrently, and wait
    /// for all of them. Subscriber errors and panics are logged and swallowed.
    pub async fn emit(&self, kind: EventKind, event: ExecutionEvent) {
        let handlers: Vec<EventHandler> = {
            let subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
            subscribers.get(&kind).cloned().unwrap_or_default()
        };

        let futures = handlers.into_iter().map(|handler| {
            let event = event.clone();
            async move {
                match std::panic::AssertUnwindSafe((handler.0)(event))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!(%err, "event subscriber failed"),
                    Err(_) => error!("event subscriber panicked"),
                }
            }
        });

        join_all(futures).await;
    }
}

/// Register a forwarding subscriber and return its handler plus an mpsc
/// receiver, so callers can await events without writing a callback. Dropping
/// the receiver quietly detaches the stream; unsubscribe with the returned
/// handler to stop delivery entirely.
pub fn subscribe_channel(
    bus: &EventBus,
    kind: EventKind,
    capacity: usize,
) -> (EventHandler, mpsc::Receiver<ExecutionEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handler = EventHandler::new(move |event| {
        let tx = tx.clone();
        async move {
            // Receiver gone; nothing to deliver to.
            let _ = tx.send(event).await;
            Ok(())
        }
        .boxed()
    });
    bus.subscribe(kind, handler.clone());
    (handler, rx)
}
