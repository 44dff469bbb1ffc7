//! In-memory reference backend. Collections are concurrent maps, change
//! fan-out is a broadcast channel, and subscriptions are spawned forwarder
//! tasks that re-run their query on every relevant event. Used by tests and
//! local development; the production backend adapts the hosted document store
//! behind the same traits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::driver::{DriverProfile, DriverStatus, GeoPoint};
use crate::models::job::SourceCollection;
use crate::models::notification::{Notification, NotificationKind};
use crate::models::proposal::FeeProposal;
use crate::store::{
    DriverCounterDelta, FieldGuard, JobStore, JobTransition, NotificationSink, NotificationStore,
    RawRecord, RecordFilter, SnapshotStream, TransitionOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    Records(SourceCollection),
    Notifications,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    orders: DashMap<String, Map<String, Value>>,
    deliveries: DashMap<String, Map<String, Value>>,
    drivers: DashMap<String, DriverProfile>,
    // TODO: cap notification retention; the map grows unbounded
    notifications: DashMap<String, Notification>,
    proposals: DashMap<String, FeeProposal>,
    events_tx: broadcast::Sender<StoreEvent>,
    snapshot_queue_size: usize,
}

impl MemoryStore {
    pub fn new(event_buffer_size: usize, snapshot_queue_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            inner: Arc::new(Inner {
                orders: DashMap::new(),
                deliveries: DashMap::new(),
                drivers: DashMap::new(),
                notifications: DashMap::new(),
                proposals: DashMap::new(),
                events_tx,
                snapshot_queue_size: snapshot_queue_size.max(1),
            }),
        }
    }

    fn records(&self, collection: SourceCollection) -> &DashMap<String, Map<String, Value>> {
        match collection {
            SourceCollection::OrderSourced => &self.inner.orders,
            SourceCollection::DeliverySourced => &self.inner.deliveries,
        }
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is fine; nobody is subscribed yet.
        let _ = self.inner.events_tx.send(event);
    }

    /// Seeds or replaces a document, as the external order-placement
    /// collaborators would.
    pub fn insert_record(&self, collection: SourceCollection, id: &str, fields: Map<String, Value>) {
        self.records(collection).insert(id.to_string(), fields);
        self.publish(StoreEvent::Records(collection));
    }

    pub fn upsert_driver(&self, profile: DriverProfile) {
        self.inner.drivers.insert(profile.id.clone(), profile);
    }

    pub fn proposals_for(&self, job_id: &str) -> Vec<FeeProposal> {
        self.inner
            .proposals
            .iter()
            .filter(|entry| entry.value().job_id == job_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn snapshot(&self, collection: SourceCollection, filter: &RecordFilter) -> Vec<RawRecord> {
        self.records(collection)
            .iter()
            .map(|entry| RawRecord {
                id: entry.key().clone(),
                fields: entry.value().clone(),
            })
            .filter(|record| filter.matches(record))
            .collect()
    }

    fn notification_snapshot(&self, recipient_id: &str, limit: usize) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = self
            .inner
            .notifications
            .iter()
            .filter(|entry| entry.value().recipient_id == recipient_id)
            .map(|entry| entry.value().clone())
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications.truncate(limit);
        notifications
    }
}

impl JobStore for MemoryStore {
    async fn query(
        &self,
        collection: SourceCollection,
        filter: &RecordFilter,
    ) -> Result<Vec<RawRecord>, DispatchError> {
        Ok(self.snapshot(collection, filter))
    }

    async fn get(
        &self,
        collection: SourceCollection,
        id: &str,
    ) -> Result<Option<RawRecord>, DispatchError> {
        Ok(self.records(collection).get(id).map(|entry| RawRecord {
            id: id.to_string(),
            fields: entry.value().clone(),
        }))
    }

    fn subscribe(&self, collection: SourceCollection, filter: RecordFilter) -> SnapshotStream {
        let (tx, rx) = mpsc::channel(self.inner.snapshot_queue_size);
        let store = self.clone();

        tokio::spawn(async move {
            let mut events = store.inner.events_tx.subscribe();
            if tx.send(store.snapshot(collection, &filter)).await.is_err() {
                return;
            }

            loop {
                match events.recv().await {
                    Ok(StoreEvent::Records(touched)) if touched == collection => {
                        if tx.send(store.snapshot(collection, &filter)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "job subscription lagged; resyncing");
                        if tx.send(store.snapshot(collection, &filter)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        ReceiverStream::new(rx)
    }

    async fn conditional_update(
        &self,
        collection: SourceCollection,
        id: &str,
        expect: Vec<FieldGuard>,
        changes: Vec<(String, Value)>,
    ) -> Result<RawRecord, DispatchError> {
        let updated = {
            let records = self.records(collection);
            let mut entry = records.get_mut(id).ok_or_else(|| {
                DispatchError::NotFound(format!("{} {id} not found", collection.collection_name()))
            })?;

            for guard in &expect {
                if !guard.holds(entry.value()) {
                    return Err(DispatchError::Conflict(format!(
                        "field {} no longer matches the expected state",
                        guard.field
                    )));
                }
            }

            for (field, value) in changes {
                entry.insert(field, value);
            }

            RawRecord {
                id: id.to_string(),
                fields: entry.value().clone(),
            }
        };

        self.publish(StoreEvent::Records(collection));
        Ok(updated)
    }

    async fn apply_transition(
        &self,
        transition: JobTransition,
    ) -> Result<TransitionOutcome, DispatchError> {
        let outcome = {
            let records = self.records(transition.collection);
            let mut entry = records.get_mut(&transition.job_id).ok_or_else(|| {
                DispatchError::NotFound(format!(
                    "{} {} not found",
                    transition.collection.collection_name(),
                    transition.job_id
                ))
            })?;

            for guard in &transition.expect {
                if !guard.holds(entry.value()) {
                    return Err(DispatchError::Conflict(format!(
                        "field {} no longer matches the expected state",
                        guard.field
                    )));
                }
            }

            for (field, value) in transition.changes {
                entry.insert(field, value);
            }

            let record = RawRecord {
                id: transition.job_id.clone(),
                fields: entry.value().clone(),
            };

            // Counter delta lands while the job entry lock is still held, so
            // the pair is observed together or not at all.
            let driver = match &transition.counters {
                Some(delta) => self.apply_counter_delta(delta),
                None => None,
            };

            TransitionOutcome { record, driver }
        };

        self.publish(StoreEvent::Records(transition.collection));
        Ok(outcome)
    }

    async fn get_driver(&self, driver_id: &str) -> Result<Option<DriverProfile>, DispatchError> {
        Ok(self
            .inner
            .drivers
            .get(driver_id)
            .map(|entry| entry.value().clone()))
    }

    async fn set_driver_status(
        &self,
        driver_id: &str,
        status: DriverStatus,
        at: DateTime<Utc>,
    ) -> Result<DriverProfile, DispatchError> {
        let mut profile = self
            .inner
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| DispatchError::NotFound(format!("driver {driver_id} not found")))?;

        profile.status = status;
        profile.last_status_update = Some(at);
        Ok(profile.clone())
    }

    async fn set_driver_location(
        &self,
        driver_id: &str,
        location: GeoPoint,
        _at: DateTime<Utc>,
    ) -> Result<DriverProfile, DispatchError> {
        let mut profile = self
            .inner
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| DispatchError::NotFound(format!("driver {driver_id} not found")))?;

        profile.location = Some(location);
        Ok(profile.clone())
    }

    async fn set_driver_counters(
        &self,
        driver_id: &str,
        active: u32,
        total: u32,
    ) -> Result<DriverProfile, DispatchError> {
        let mut profile = self
            .inner
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| DispatchError::NotFound(format!("driver {driver_id} not found")))?;

        profile.active_deliveries = active;
        profile.total_deliveries = total;
        Ok(profile.clone())
    }

    async fn add_proposal(&self, proposal: FeeProposal) -> Result<(), DispatchError> {
        self.inner
            .proposals
            .insert(proposal.id.clone(), proposal);
        Ok(())
    }
}

impl MemoryStore {
    fn apply_counter_delta(&self, delta: &DriverCounterDelta) -> Option<DriverProfile> {
        match self.inner.drivers.get_mut(&delta.driver_id) {
            Some(mut profile) => {
                profile.active_deliveries = if delta.active >= 0 {
                    profile.active_deliveries.saturating_add(delta.active as u32)
                } else {
                    profile.active_deliveries.saturating_sub(delta.active.unsigned_abs())
                };
                profile.total_deliveries = profile.total_deliveries.saturating_add(delta.completed);
                profile.total_earnings += delta.earnings;
                Some(profile.clone())
            }
            None => {
                // The job write stands; reconciliation from history repairs
                // the counters later.
                warn!(driver = %delta.driver_id, "driver profile missing during counter update");
                None
            }
        }
    }
}

impl NotificationSink for MemoryStore {
    async fn notify(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
        delivery_id: Option<&str>,
    ) -> Result<(), DispatchError> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            recipient_id: recipient_id.to_string(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            delivery_id: delivery_id.map(str::to_string),
            read: false,
            created_at: Utc::now(),
        };

        self.inner
            .notifications
            .insert(notification.id.clone(), notification);
        self.publish(StoreEvent::Notifications);
        Ok(())
    }
}

impl NotificationStore for MemoryStore {
    async fn notifications_for(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, DispatchError> {
        Ok(self.notification_snapshot(recipient_id, limit))
    }

    async fn mark_all_read(&self, recipient_id: &str) -> Result<usize, DispatchError> {
        let mut flipped = 0;
        for mut entry in self.inner.notifications.iter_mut() {
            let notification = entry.value_mut();
            if notification.recipient_id == recipient_id && !notification.read {
                notification.read = true;
                flipped += 1;
            }
        }

        if flipped > 0 {
            self.publish(StoreEvent::Notifications);
        }
        Ok(flipped)
    }

    fn subscribe_notifications(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> ReceiverStream<Vec<Notification>> {
        let (tx, rx) = mpsc::channel(self.inner.snapshot_queue_size);
        let store = self.clone();
        let recipient = recipient_id.to_string();

        tokio::spawn(async move {
            let mut events = store.inner.events_tx.subscribe();
            if tx
                .send(store.notification_snapshot(&recipient, limit))
                .await
                .is_err()
            {
                return;
            }

            loop {
                match events.recv().await {
                    Ok(StoreEvent::Notifications) => {
                        if tx
                            .send(store.notification_snapshot(&recipient, limit))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "notification subscription lagged; resyncing");
                        if tx
                            .send(store.notification_snapshot(&recipient, limit))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        ReceiverStream::new(rx)
    }
}
