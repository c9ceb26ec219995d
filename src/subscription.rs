//! Action-control subscriptions.
//!
//! A subscription listens to control presses in one namespace (a draft's
//! review, or a published artifact), optionally only from one user, and
//! dispatches each match to a handler, one at a time and in arrival order.
//! A bounded subscription fires `on_expired` exactly once when its window
//! runs out. Once stopped, by expiry or explicitly, nothing else is
//! dispatched, including presses already queued. A subscription whose task
//! ends for any reason, a panicking handler included, counts as stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use opentelemetry::KeyValue;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controls::{self, ControlAction};
use crate::error::Result;
use crate::model::UserId;
use crate::platform::{ControlPress, InboundEvent};
use crate::telemetry::metrics;

/// Receives the presses a subscription resolves.
#[async_trait]
pub trait PressHandler: Send + Sync + 'static {
    type Action: ControlAction;

    async fn on_press(&self, action: Self::Action, press: ControlPress) -> Result<()>;

    /// Called once when a bounded subscription's window elapses.
    async fn on_expired(&self) -> Result<()> {
        Ok(())
    }
}

/// What a subscription listens for.
#[derive(Debug, Clone)]
pub struct PressFilter {
    pub namespace: String,
    /// Only presses from this user; `None` accepts everyone.
    pub user: Option<UserId>,
}

impl PressFilter {
    fn resolve<A: ControlAction>(&self, press: &ControlPress) -> Option<A> {
        if let Some(user) = &self.user {
            if &press.user.id != user {
                return None;
            }
        }
        controls::decode(&self.namespace, &press.control_id)
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a running subscription. Cloning shares the same subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    namespace: String,
    token: CancellationToken,
}

impl Subscription {
    /// Start dispatching presses from `events` that pass `filter`.
    ///
    /// With a `timeout`, the subscription expires that long from now.
    pub fn spawn<H: PressHandler>(
        filter: PressFilter,
        timeout: Option<Duration>,
        events: broadcast::Receiver<InboundEvent>,
        handler: H,
    ) -> Self {
        let token = CancellationToken::new();
        let subscription = Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            namespace: filter.namespace.clone(),
            token: token.clone(),
        };
        let deadline = timeout.map(|t| Instant::now() + t);
        debug!(namespace = %filter.namespace, ?timeout, "subscription started");
        tokio::spawn(run(filter, deadline, events, handler, token));
        subscription
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Stop dispatching. Safe to call any number of times, including after
    /// the subscription expired on its own.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            debug!(namespace = %self.namespace, "subscription stopped");
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the subscription has stopped.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

async fn run<H: PressHandler>(
    filter: PressFilter,
    deadline: Option<Instant>,
    mut events: broadcast::Receiver<InboundEvent>,
    handler: H,
    token: CancellationToken,
) {
    let _stopped_on_exit = token.clone().drop_guard();
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = sleep_until(deadline) => {
                token.cancel();
                info!(namespace = %filter.namespace, "subscription expired");
                metrics::subscriptions_expired()
                    .add(1, &[KeyValue::new("kind", H::Action::KIND)]);
                if let Err(e) = handler.on_expired().await {
                    error!(namespace = %filter.namespace, "expiry handler failed: {e}");
                }
                break;
            }
            event = events.recv() => event,
        };

        match event {
            Ok(InboundEvent::ControlPressed(press)) => {
                let Some(action) = filter.resolve::<H::Action>(&press) else {
                    continue;
                };
                if token.is_cancelled() {
                    break;
                }
                debug!(namespace = %filter.namespace, ?action, user = %press.user.id, "dispatching press");
                if let Err(e) = handler.on_press(action, press).await {
                    error!(namespace = %filter.namespace, ?action, "press handler failed: {e}");
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(namespace = %filter.namespace, skipped, "subscription lagged");
            }
            Err(RecvError::Closed) => {
                token.cancel();
                break;
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// At most one live subscription per namespace. Entries are dropped once
/// their subscription stops.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    live: Arc<DashMap<String, Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live subscription for `filter.namespace`, or spawn one.
    ///
    /// When one is already live, `events` and `handler` are dropped and the
    /// existing subscription is returned untouched.
    pub fn get_or_create<H: PressHandler>(
        &self,
        filter: PressFilter,
        timeout: Option<Duration>,
        events: broadcast::Receiver<InboundEvent>,
        handler: H,
    ) -> Subscription {
        let subscription = match self.live.entry(filter.namespace.clone()) {
            Entry::Occupied(mut slot) => {
                if !slot.get().is_stopped() {
                    debug!(namespace = %filter.namespace, "reusing live subscription");
                    return slot.get().clone();
                }
                let subscription = Subscription::spawn(filter, timeout, events, handler);
                slot.insert(subscription.clone());
                subscription
            }
            Entry::Vacant(slot) => {
                let subscription = Subscription::spawn(filter, timeout, events, handler);
                slot.insert(subscription.clone());
                subscription
            }
        };
        self.forget_when_stopped(subscription.clone());
        subscription
    }

    fn forget_when_stopped(&self, subscription: Subscription) {
        let live = Arc::clone(&self.live);
        tokio::spawn(async move {
            subscription.stopped().await;
            live.remove_if(&subscription.namespace, |_, current| {
                current.id == subscription.id
            });
        });
    }

    pub fn get(&self, namespace: &str) -> Option<Subscription> {
        self.live.get(namespace).map(|s| s.clone())
    }

    pub fn is_live(&self, namespace: &str) -> bool {
        self.live
            .get(namespace)
            .is_some_and(|s| !s.is_stopped())
    }

    /// Stop and forget the namespace's subscription, if any.
    pub fn stop(&self, namespace: &str) {
        if let Some((_, subscription)) = self.live.remove(namespace) {
            subscription.stop();
        }
    }

    /// Stop everything, e.g. on shutdown.
    pub fn stop_all(&self) {
        for entry in self.live.iter() {
            entry.value().stop();
        }
        self.live.clear();
    }
}
