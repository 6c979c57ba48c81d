//! Message routing
//!
//! The router holds (message-type, handler, optional predicate) routes and
//! global filters. Dispatch fans out: every matching route receives the
//! message, in registration order, and a failing handler never prevents the
//! remaining handlers from running.
//!
//! ```text
//! Connection ──> RoutedMessage ──> filters ──> type match ──> predicate ──> handler
//!                                     │                                       │
//!                                  any false: dropped              per-route counters
//! ```

use crate::envelope::Envelope;
use crate::traits::{DuraSockError, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// An inbound envelope tagged with its source
#[derive(Debug, Clone)]
pub struct RoutedMessage {
    /// Identity of the originating connection, when dispatched by a manager
    pub origin: Option<String>,
    /// Receipt timestamp, stamped when the frame was decoded
    pub received_at: SystemTime,
    pub envelope: Envelope,
}

impl RoutedMessage {
    /// Wrap an envelope with no origin (for direct dispatch)
    pub fn local(envelope: Envelope) -> Self {
        Self {
            origin: None,
            received_at: SystemTime::now(),
            envelope,
        }
    }
}

pub type RouteHandlerFn = Arc<dyn Fn(&RoutedMessage) -> Result<()> + Send + Sync>;
pub type RoutePredicateFn = Arc<dyn Fn(&RoutedMessage) -> bool + Send + Sync>;
pub type FilterFn = Arc<dyn Fn(&RoutedMessage) -> bool + Send + Sync>;
pub type HandlerErrorObserver = Arc<dyn Fn(&DuraSockError) + Send + Sync>;

/// Handle for removing a route registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteHandle(u64);

/// Handle for removing a global filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterHandle(u64);

struct Route {
    id: u64,
    message_type: String,
    handler: RouteHandlerFn,
    predicate: Option<RoutePredicateFn>,
    delivered_count: u64,
    last_delivered: Option<SystemTime>,
}

#[derive(Default)]
struct RouterInner {
    next_id: u64,
    routes: Vec<Route>,
    filters: Vec<(u64, FilterFn)>,
    handler_error_observer: Option<HandlerErrorObserver>,
}

/// Per-route delivery counters
#[derive(Debug, Clone)]
pub struct RouteMetrics {
    pub message_type: String,
    pub delivered_count: u64,
    pub last_delivered: Option<SystemTime>,
}

/// Snapshot of the router's registrations and counters
#[derive(Debug, Clone)]
pub struct RouterMetrics {
    pub route_count: usize,
    pub filter_count: usize,
    pub per_route: Vec<RouteMetrics>,
}

/// Registers routes and filters, and fans inbound messages out to handlers
///
/// Routes are not unique by type: several handlers may register for the same
/// message type and all of them receive each matching message, independent of
/// each other's success or failure. Handlers run outside the internal lock,
/// so they may register or remove routes themselves.
#[derive(Default)]
pub struct MessageRouter {
    inner: RwLock<RouterInner>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a message type
    pub fn add_route<F>(&self, message_type: impl Into<String>, handler: F) -> RouteHandle
    where
        F: Fn(&RoutedMessage) -> Result<()> + Send + Sync + 'static,
    {
        self.insert_route(message_type.into(), Arc::new(handler), None)
    }

    /// Register a handler guarded by an additional acceptance predicate
    pub fn add_route_when<P, F>(
        &self,
        message_type: impl Into<String>,
        predicate: P,
        handler: F,
    ) -> RouteHandle
    where
        P: Fn(&RoutedMessage) -> bool + Send + Sync + 'static,
        F: Fn(&RoutedMessage) -> Result<()> + Send + Sync + 'static,
    {
        self.insert_route(
            message_type.into(),
            Arc::new(handler),
            Some(Arc::new(predicate) as RoutePredicateFn),
        )
    }

    fn insert_route(
        &self,
        message_type: String,
        handler: RouteHandlerFn,
        predicate: Option<RoutePredicateFn>,
    ) -> RouteHandle {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        debug!(%message_type, id, "route added");
        inner.routes.push(Route {
            id,
            message_type,
            handler,
            predicate,
            delivered_count: 0,
            last_delivered: None,
        });
        RouteHandle(id)
    }

    /// Remove exactly this registration; no-op if already removed
    pub fn remove_route(&self, handle: RouteHandle) {
        let mut inner = self.inner.write();
        inner.routes.retain(|route| route.id != handle.0);
    }

    /// Add a global filter; a message any filter rejects reaches no route
    pub fn add_filter<F>(&self, filter: F) -> FilterHandle
    where
        F: Fn(&RoutedMessage) -> bool + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.filters.push((id, Arc::new(filter)));
        FilterHandle(id)
    }

    /// Remove a filter; no-op if already removed
    pub fn remove_filter(&self, handle: FilterHandle) {
        let mut inner = self.inner.write();
        inner.filters.retain(|(id, _)| *id != handle.0);
    }

    /// Designated channel for handler failures
    ///
    /// Replaces any previously set observer. Failures are also logged.
    pub fn set_handler_error_observer<F>(&self, observer: F)
    where
        F: Fn(&DuraSockError) + Send + Sync + 'static,
    {
        self.inner.write().handler_error_observer = Some(Arc::new(observer));
    }

    /// Dispatch a message to every matching route
    ///
    /// Returns true when at least one matching handler ran successfully.
    /// Invocation order is registration order.
    pub fn dispatch(&self, message: &RoutedMessage) -> bool {
        // Snapshot matching handlers under the lock, invoke outside it
        let (matched, error_observer) = {
            let inner = self.inner.read();

            for (_, filter) in &inner.filters {
                if !filter(message) {
                    debug!(message_type = %message.envelope.kind, "dropped by filter");
                    return false;
                }
            }

            let matched: Vec<(u64, RouteHandlerFn)> = inner
                .routes
                .iter()
                .filter(|route| route.message_type == message.envelope.kind)
                .filter(|route| {
                    route
                        .predicate
                        .as_ref()
                        .map_or(true, |predicate| predicate(message))
                })
                .map(|route| (route.id, Arc::clone(&route.handler)))
                .collect();

            (matched, inner.handler_error_observer.clone())
        };

        let mut delivered = Vec::new();
        for (id, handler) in matched {
            match handler(message) {
                Ok(()) => delivered.push(id),
                Err(e) => {
                    let wrapped = DuraSockError::Handler {
                        message_type: message.envelope.kind.clone(),
                        reason: e.to_string(),
                    };
                    warn!(error = %wrapped, "route handler failed");
                    if let Some(observer) = &error_observer {
                        observer(&wrapped);
                    }
                }
            }
        }

        if delivered.is_empty() {
            return false;
        }

        let now = SystemTime::now();
        let mut inner = self.inner.write();
        for route in inner.routes.iter_mut() {
            if delivered.contains(&route.id) {
                route.delivered_count += 1;
                route.last_delivered = Some(now);
            }
        }
        true
    }

    /// Snapshot of routes, filters and per-route counters
    pub fn metrics(&self) -> RouterMetrics {
        let inner = self.inner.read();
        RouterMetrics {
            route_count: inner.routes.len(),
            filter_count: inner.filters.len(),
            per_route: inner
                .routes
                .iter()
                .map(|route| RouteMetrics {
                    message_type: route.message_type.clone(),
                    delivered_count: route.delivered_count,
                    last_delivered: route.last_delivered,
                })
                .collect(),
        }
    }
}
