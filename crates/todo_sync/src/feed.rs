//! Live notification list for the current user.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use entities::Notification;
use todo_store::{NotificationStore, StoreResult, Subscription};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::reconcile::{reconcile, visible, NotificationEvent};

/// Warning shown once the backend has ended the push subscription.
pub const SUBSCRIPTION_CLOSED: &str = "Live updates stopped: the notification subscription was closed.";

#[derive(Debug, Default)]
struct FeedState {
    recipient_id: Option<String>,
    generation: u64,
    notifications: Vec<Notification>,
    warning: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared state written by both the fetch and the subscription task.
#[derive(Clone)]
struct FeedShared {
    state: Arc<Mutex<FeedState>>,
    updates: watch::Sender<Vec<Notification>>,
}

impl FeedShared {
    /// Applies `event` if `generation` is still current.
    fn apply(&self, generation: u64, event: NotificationEvent) -> bool {
        let mut state = lock(&self.state);
        if state.generation != generation {
            return false;
        }
        state.notifications = reconcile(&state.notifications, event);
        self.updates.send_replace(state.notifications.clone());
        true
    }

    /// Records that the push subscription of `generation` was ended by the
    /// backend.
    fn disconnected(&self, generation: u64) {
        let mut state = lock(&self.state);
        if state.generation != generation {
            return;
        }
        warn!(recipient = ?state.recipient_id, "Notification subscription closed by the server");
        state.warning = Some(SUBSCRIPTION_CLOSED.to_string());
        self.updates.send_replace(state.notifications.clone());
    }
}

/// Notifications for one recipient, kept current by a push subscription.
///
/// Starting the feed subscribes first and fetches second, so nothing
/// inserted in between is missed. Pushed items and the fetch result are
/// merged by id in whichever order they arrive. Results belonging to a
/// previous recipient are discarded.
pub struct NotificationFeed {
    store: NotificationStore,
    shared: FeedShared,
    subscription: Mutex<Option<Subscription>>,
}

impl NotificationFeed {
    /// Creates a stopped feed.
    pub fn new(store: NotificationStore) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            store,
            shared: FeedShared {
                state: Arc::new(Mutex::new(FeedState::default())),
                updates,
            },
            subscription: Mutex::new(None),
        }
    }

    /// Starts the feed for `recipient_id`, replacing any previous recipient.
    ///
    /// A fetch failure is non-fatal: pushed items are kept and the failure is
    /// exposed through [`warning`](Self::warning). A subscription failure is
    /// returned after the fetch has been attempted.
    pub async fn start(&self, recipient_id: &str) -> StoreResult<()> {
        let generation = {
            let mut state = lock(&self.shared.state);
            state.generation += 1;
            state.recipient_id = Some(recipient_id.to_string());
            state.notifications.clear();
            state.warning = None;
            self.shared.updates.send_replace(Vec::new());
            state.generation
        };
        self.release_subscription();

        let sink = self.shared.clone();
        let subscribed = self
            .store
            .subscribe(recipient_id, move |notification| {
                let id = notification.id;
                if !sink.apply(generation, NotificationEvent::Inserted(notification)) {
                    debug!(notification_id = id, "Dropping push for a replaced recipient");
                }
            })
            .await;

        let subscribe_error = match subscribed {
            Ok(subscription) if self.is_current(generation) => {
                let sink = self.shared.clone();
                subscription.on_closed(move || sink.disconnected(generation));
                *lock(&self.subscription) = Some(subscription);
                None
            }
            Ok(subscription) => {
                subscription.unsubscribe();
                return Ok(());
            }
            Err(e) => {
                warn!(recipient = %recipient_id, error = %e, "Notification subscription failed");
                self.set_warning(generation, e.to_string());
                Some(e)
            }
        };

        match self.store.list_notifications(recipient_id).await {
            Ok(fetched) => {
                let count = fetched.len();
                if self
                    .shared
                    .apply(generation, NotificationEvent::Fetched(fetched))
                {
                    info!(recipient = %recipient_id, count, "Notification feed loaded");
                } else {
                    debug!(recipient = %recipient_id, "Discarding notifications for a replaced recipient");
                }
            }
            Err(e) => {
                warn!(recipient = %recipient_id, error = %e, "Failed to fetch notifications");
                self.set_warning(generation, e.to_string());
            }
        }

        match subscribe_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stops the feed and releases the subscription. Calling it again has no
    /// effect.
    pub fn stop(&self) {
        {
            let mut state = lock(&self.shared.state);
            if state.recipient_id.take().is_some() {
                state.generation += 1;
            }
        }
        self.release_subscription();
    }

    /// Recipient the feed is running for.
    pub fn recipient_id(&self) -> Option<String> {
        lock(&self.shared.state).recipient_id.clone()
    }

    /// Returns true while a push subscription is held and still delivering.
    pub fn is_subscribed(&self) -> bool {
        lock(&self.subscription)
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Every known notification, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.shared.state).notifications.clone()
    }

    /// The notifications to display.
    pub fn visible(&self) -> Vec<Notification> {
        visible(&lock(&self.shared.state).notifications).to_vec()
    }

    /// The last non-fatal failure, if any.
    pub fn warning(&self) -> Option<String> {
        lock(&self.shared.state).warning.clone()
    }

    /// Receives a snapshot of the list after every change, and once more when
    /// the push subscription is lost.
    pub fn updates(&self) -> watch::Receiver<Vec<Notification>> {
        self.shared.updates.subscribe()
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.shared.state).generation == generation
    }

    fn set_warning(&self, generation: u64, warning: String) {
        let mut state = lock(&self.shared.state);
        if state.generation == generation {
            state.warning = Some(warning);
        }
    }

    fn release_subscription(&self) {
        if let Some(subscription) = lock(&self.subscription).take() {
            subscription.unsubscribe();
        }
    }
}

impl Drop for NotificationFeed {
    fn drop(&mut self) {
        self.release_subscription();
    }
}
