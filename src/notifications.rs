//! Per-recipient notification feed with read/unread accounting. The feed is a
//! consumer of the notification collaborator: the dispatch engine creates
//! notifications through the sink, this module only reads and acknowledges.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::error::DispatchError;
use crate::models::notification::Notification;
use crate::store::NotificationStore;

pub struct NotificationFeed<S> {
    store: Arc<S>,
    recipient_id: String,
    limit: usize,
}

impl<S: NotificationStore> NotificationFeed<S> {
    pub fn new(store: Arc<S>, recipient_id: impl Into<String>, limit: usize) -> Self {
        Self {
            store,
            recipient_id: recipient_id.into(),
            limit,
        }
    }

    /// Newest first, capped at the feed limit.
    pub async fn load(&self) -> Result<Vec<Notification>, DispatchError> {
        self.store
            .notifications_for(&self.recipient_id, self.limit)
            .await
    }

    pub async fn unread_count(&self) -> Result<usize, DispatchError> {
        let notifications = self.load().await?;
        Ok(notifications.iter().filter(|n| !n.read).count())
    }

    pub async fn mark_all_read(&self) -> Result<usize, DispatchError> {
        self.store.mark_all_read(&self.recipient_id).await
    }

    /// Push updates only.
    pub fn subscribe(&self) -> ReceiverStream<Vec<Notification>> {
        self.store
            .subscribe_notifications(&self.recipient_id, self.limit)
    }

    /// Push updates plus a periodic refresh tick, in case the push channel
    /// goes quiet while the store keeps changing underneath.
    pub fn subscribe_with_refresh(&self, every: Duration) -> ReceiverStream<Vec<Notification>> {
        let (tx, rx) = mpsc::channel(8);
        let mut pushed = self.subscribe();
        let store = self.store.clone();
        let recipient = self.recipient_id.clone();
        let limit = self.limit;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately and would duplicate the
            // subscription's initial snapshot.
            ticker.tick().await;

            loop {
                tokio::select! {
                    snapshot = pushed.next() => match snapshot {
                        Some(notifications) => {
                            if tx.send(notifications).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        match store.notifications_for(&recipient, limit).await {
                            Ok(notifications) => {
                                if tx.send(notifications).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => warn!(error = %err, "notification refresh failed"),
                        }
                    }
                }
            }
        });

        ReceiverStream::new(rx)
    }
}
