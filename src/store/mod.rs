//! Abstraction over the persistent document store. The backing service offers
//! equality-predicate queries, push-based snapshot subscriptions, and guarded
//! conditional writes; everything richer (multi-status filters, text search,
//! ordering) happens client-side after normalization.

pub mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::DispatchError;
use crate::models::driver::{DriverProfile, DriverStatus, GeoPoint};
use crate::models::job::SourceCollection;
use crate::models::notification::{Notification, NotificationKind};
use crate::models::proposal::FeeProposal;

/// One document from a source collection, untyped until normalized.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Conjunction of field-equality constraints, the only predicate shape the
/// backing store can serve from an index. A `Null` expectation matches a
/// missing field.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub equals: Vec<(String, Value)>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.equals.push((field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, record: &RawRecord) -> bool {
        self.equals.iter().all(|(field, expected)| {
            match record.fields.get(field) {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            }
        })
    }
}

/// A guard evaluated inside the store immediately before a write is applied.
/// Mismatch fails the whole operation with `Conflict`.
#[derive(Debug, Clone)]
pub struct FieldGuard {
    pub field: String,
    pub expect: Value,
}

impl FieldGuard {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            expect: value.into(),
        }
    }

    /// Holds when the field is missing or explicitly null.
    pub fn absent(field: &str) -> Self {
        Self {
            field: field.to_string(),
            expect: Value::Null,
        }
    }

    pub fn holds(&self, fields: &Map<String, Value>) -> bool {
        match fields.get(&self.field) {
            Some(actual) => *actual == self.expect,
            None => self.expect.is_null(),
        }
    }
}

/// Server-side delta applied to the driver aggregate in the same transaction
/// as the job write, so a status flip and its counter can never diverge.
#[derive(Debug, Clone)]
pub struct DriverCounterDelta {
    pub driver_id: String,
    /// Applied to `activeDeliveries`, floored at zero.
    pub active: i32,
    /// Added to `totalDeliveries`.
    pub completed: u32,
    /// Added to `totalEarnings`.
    pub earnings: f64,
}

#[derive(Debug, Clone)]
pub struct JobTransition {
    pub collection: SourceCollection,
    pub job_id: String,
    pub expect: Vec<FieldGuard>,
    pub changes: Vec<(String, Value)>,
    pub counters: Option<DriverCounterDelta>,
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub record: RawRecord,
    /// Present when the counter delta found its profile.
    pub driver: Option<DriverProfile>,
}

pub type SnapshotStream = ReceiverStream<Vec<RawRecord>>;

pub trait JobStore: Send + Sync + 'static {
    fn query(
        &self,
        collection: SourceCollection,
        filter: &RecordFilter,
    ) -> impl Future<Output = Result<Vec<RawRecord>, DispatchError>> + Send;

    fn get(
        &self,
        collection: SourceCollection,
        id: &str,
    ) -> impl Future<Output = Result<Option<RawRecord>, DispatchError>> + Send;

    /// Push channel: emits the current result set immediately, then again
    /// after every write touching the collection. Dropping the stream cancels
    /// the subscription.
    fn subscribe(&self, collection: SourceCollection, filter: RecordFilter) -> SnapshotStream;

    /// Guarded write. An empty guard list makes the update unconditional.
    fn conditional_update(
        &self,
        collection: SourceCollection,
        id: &str,
        expect: Vec<FieldGuard>,
        changes: Vec<(String, Value)>,
    ) -> impl Future<Output = Result<RawRecord, DispatchError>> + Send;

    /// Guarded job write plus driver-counter delta as one atomic transaction.
    fn apply_transition(
        &self,
        transition: JobTransition,
    ) -> impl Future<Output = Result<TransitionOutcome, DispatchError>> + Send;

    fn get_driver(
        &self,
        driver_id: &str,
    ) -> impl Future<Output = Result<Option<DriverProfile>, DispatchError>> + Send;

    fn set_driver_status(
        &self,
        driver_id: &str,
        status: DriverStatus,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<DriverProfile, DispatchError>> + Send;

    fn set_driver_location(
        &self,
        driver_id: &str,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<DriverProfile, DispatchError>> + Send;

    /// Authoritative counter write-back used by history reconciliation.
    fn set_driver_counters(
        &self,
        driver_id: &str,
        active: u32,
        total: u32,
    ) -> impl Future<Output = Result<DriverProfile, DispatchError>> + Send;

    fn add_proposal(
        &self,
        proposal: FeeProposal,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

/// External notification creation; policy about who gets notified lives with
/// the callers, the sink just records and fans out.
pub trait NotificationSink: Send + Sync + 'static {
    fn notify(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        title: &str,
        message: &str,
        delivery_id: Option<&str>,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

pub trait NotificationStore: Send + Sync + 'static {
    /// Newest first, capped at `limit`.
    fn notifications_for(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Notification>, DispatchError>> + Send;

    /// Returns how many notifications flipped from unread to read.
    fn mark_all_read(
        &self,
        recipient_id: &str,
    ) -> impl Future<Output = Result<usize, DispatchError>> + Send;

    fn subscribe_notifications(
        &self,
        recipient_id: &str,
        limit: usize,
    ) -> ReceiverStream<Vec<Notification>>;
}
