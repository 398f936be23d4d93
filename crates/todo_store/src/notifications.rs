//! Notification accessor and push subscriptions.

use std::sync::Arc;

use entities::{NewNotification, Notification};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    decode::{decode_row, decode_rows},
    Backend, ChangeFeed, ChangeFilter, ChangeStream, Query, StoreResult, NOTIFICATIONS_TABLE,
};

/// Reads, creates and subscribes to notifications.
#[derive(Clone)]
pub struct NotificationStore {
    backend: Arc<dyn Backend>,
}

impl NotificationStore {
    /// Creates a notification store over `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Lists the recipient's notifications, newest first.
    pub async fn list_notifications(&self, recipient_id: &str) -> StoreResult<Vec<Notification>> {
        let query = Query::table(NOTIFICATIONS_TABLE)
            .eq("recipient_id", recipient_id)
            .order("created_at", false)
            .order("id", false);
        let rows = self.backend.select(&query).await?;
        debug!(recipient = %recipient_id, count = rows.len(), "Listed notifications");
        decode_rows("Notification", rows)
    }

    /// Creates a notification.
    pub async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        let row = self
            .backend
            .insert(NOTIFICATIONS_TABLE, serde_json::to_value(&notification)?)
            .await?;
        let created: Notification = decode_row("Notification", row)?;
        info!(
            notification_id = created.id,
            recipient = %created.recipient_id,
            sender = %created.sender_id,
            "Notification created"
        );
        Ok(created)
    }

    /// Subscribes to notifications inserted for `recipient_id`.
    ///
    /// `on_insert` runs on a background task for every pushed row until the
    /// returned handle is unsubscribed or dropped, or the backend ends the
    /// feed. The latter is reported through [`Subscription::on_closed`].
    pub async fn subscribe<F>(&self, recipient_id: &str, on_insert: F) -> StoreResult<Subscription>
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        let feed = ChangeFeed::inserts(NOTIFICATIONS_TABLE)
            .with_filter(ChangeFilter::eq("recipient_id", recipient_id));
        let stream = self.backend.subscribe(&feed).await?;

        let token = CancellationToken::new();
        let closed = CancellationToken::new();
        tokio::spawn(forward_inserts(
            stream,
            recipient_id.to_string(),
            token.clone(),
            closed.clone(),
            on_insert,
        ));

        if let Some(filter) = &feed.filter {
            info!(recipient = %recipient_id, %filter, "Notification subscription opened");
        }
        Ok(Subscription {
            recipient_id: recipient_id.to_string(),
            token,
            closed,
        })
    }
}

async fn forward_inserts<F>(
    mut stream: ChangeStream,
    recipient_id: String,
    token: CancellationToken,
    closed: CancellationToken,
    on_insert: F,
) where
    F: Fn(Notification) + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            row = stream.recv() => {
                let Some(row) = row else {
                    warn!(recipient = %recipient_id, "Change stream closed by backend");
                    closed.cancel();
                    break;
                };
                match decode_row::<Notification>("Notification", row) {
                    Ok(notification) if notification.recipient_id == recipient_id => {
                        on_insert(notification)
                    }
                    Ok(notification) => {
                        debug!(
                            recipient = %recipient_id,
                            other = %notification.recipient_id,
                            "Ignoring notification for another recipient"
                        );
                    }
                    Err(e) => warn!(recipient = %recipient_id, error = %e, "Skipping undecodable notification"),
                }
            }
        }
    }
    stream.close();
}

/// Handle of a standing notification subscription.
///
/// Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    recipient_id: String,
    token: CancellationToken,
    closed: CancellationToken,
}

impl Subscription {
    /// Recipient the subscription is filtered to.
    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    /// Returns true until the subscription is released or the backend ends
    /// the feed.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.closed.is_cancelled()
    }

    /// Runs `f` once if the backend ends the feed before the subscription is
    /// released.
    pub fn on_closed<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.token.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = closed.cancelled() => f(),
            }
        });
    }

    /// Releases the subscription. Calling it again has no effect.
    pub fn unsubscribe(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        info!(recipient = %self.recipient_id, "Notification subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
