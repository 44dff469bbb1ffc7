//! The job lifecycle state machine: `PendingDelivery → InDelivery →
//! Delivered`, linear, forward-only. Acceptance is arbitrated by a guarded
//! conditional write because every driver observes the same pending pool
//! through live subscriptions; the write result is authoritative and the UI
//! reconciles against it, never ahead of it.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{DispatchError, Precondition};
use crate::models::driver::DriverProfile;
use crate::models::job::{DeliveryJob, JobStatus, SourceCollection};
use crate::models::notification::NotificationKind;
use crate::normalize::normalize;
use crate::observability::metrics::Metrics;
use crate::store::{DriverCounterDelta, FieldGuard, JobStore, JobTransition, NotificationSink};

pub struct Dispatcher<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    metrics: Metrics,
}

impl<S: JobStore, N: NotificationSink> Dispatcher<S, N> {
    pub fn new(store: Arc<S>, notifier: Arc<N>, metrics: Metrics) -> Self {
        Self {
            store,
            notifier,
            metrics,
        }
    }

    /// Claims a pending job for `driver_id`. Exactly one of any number of
    /// concurrent callers wins; the rest get `Conflict` and should re-fetch
    /// the job rather than retry.
    pub async fn accept(
        &self,
        collection: SourceCollection,
        job_id: &str,
        driver_id: &str,
    ) -> Result<DeliveryJob, DispatchError> {
        let start = Instant::now();
        let result = self.accept_inner(collection, job_id, driver_id).await;
        self.metrics
            .record_transition("accept", outcome_label(&result), start.elapsed());
        result
    }

    /// Marks an in-delivery job as delivered by its assigned driver.
    pub async fn complete(
        &self,
        collection: SourceCollection,
        job_id: &str,
        driver_id: &str,
    ) -> Result<DeliveryJob, DispatchError> {
        let start = Instant::now();
        let result = self.complete_inner(collection, job_id, driver_id).await;
        self.metrics
            .record_transition("complete", outcome_label(&result), start.elapsed());
        result
    }

    async fn accept_inner(
        &self,
        collection: SourceCollection,
        job_id: &str,
        driver_id: &str,
    ) -> Result<DeliveryJob, DispatchError> {
        let driver = self
            .store
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("driver {driver_id} not found")))?;

        if !driver.status.permits_accept() {
            return Err(DispatchError::PreconditionFailed(
                Precondition::DriverUnavailable,
            ));
        }

        let raw = self
            .store
            .get(collection, job_id)
            .await?
            .ok_or_else(|| {
                DispatchError::NotFound(format!(
                    "{} {job_id} not found",
                    collection.collection_name()
                ))
            })?;

        let current = normalize(&raw, collection);
        if !current.is_deliverable() {
            return Err(DispatchError::Conflict(
                "job is no longer available".to_string(),
            ));
        }

        let stamp = Utc::now().to_rfc3339();
        let mut changes = vec![
            ("status".to_string(), Value::from(collection.in_delivery_status())),
            (collection.assignee_field().to_string(), Value::from(driver_id)),
            ("deliveryName".to_string(), Value::from(driver.name.as_str())),
            ("deliveryPhone".to_string(), Value::from(driver.phone.as_str())),
            ("assignedAt".to_string(), Value::from(stamp.as_str())),
        ];
        if collection == SourceCollection::DeliverySourced {
            // Delivery documents carry both spellings of the assignee field.
            changes.push(("assignedDelivery".to_string(), Value::from(driver_id)));
        }

        let outcome = self
            .store
            .apply_transition(JobTransition {
                collection,
                job_id: job_id.to_string(),
                expect: vec![
                    FieldGuard::eq("status", collection.pending_status()),
                    FieldGuard::absent(collection.assignee_field()),
                ],
                changes,
                counters: Some(DriverCounterDelta {
                    driver_id: driver_id.to_string(),
                    active: 1,
                    completed: 0,
                    earnings: 0.0,
                }),
            })
            .await?;

        if let Some(profile) = &outcome.driver {
            self.metrics
                .set_active_deliveries(&profile.id, profile.active_deliveries);
        }

        let accepted = normalize(&outcome.record, collection);

        if let Some(order_id) = accepted.originating_order.clone() {
            self.mirror_accept(&order_id, driver_id, &driver, &stamp).await;
        }

        self.send_accept_notifications(&accepted, &driver).await;

        info!(job = %accepted.id, driver = %driver_id, "job accepted");
        Ok(accepted)
    }

    async fn complete_inner(
        &self,
        collection: SourceCollection,
        job_id: &str,
        driver_id: &str,
    ) -> Result<DeliveryJob, DispatchError> {
        let raw = self
            .store
            .get(collection, job_id)
            .await?
            .ok_or_else(|| {
                DispatchError::NotFound(format!(
                    "{} {job_id} not found",
                    collection.collection_name()
                ))
            })?;

        let current = normalize(&raw, collection);
        if !current.assigned_to(driver_id) {
            return Err(DispatchError::PreconditionFailed(
                Precondition::NotAssignedToCaller,
            ));
        }
        if current.status != JobStatus::InDelivery {
            return Err(DispatchError::PreconditionFailed(Precondition::WrongState));
        }

        // What the driver actually earns; a customer-accepted counter-offer
        // overrides the listed fee.
        let earnings = raw
            .fields
            .get("proposedFee")
            .and_then(Value::as_f64)
            .unwrap_or(current.fee);

        let stamp = Utc::now().to_rfc3339();
        let outcome = self
            .store
            .apply_transition(JobTransition {
                collection,
                job_id: job_id.to_string(),
                expect: vec![
                    FieldGuard::eq("status", collection.in_delivery_status()),
                    FieldGuard::eq(collection.assignee_field(), driver_id),
                ],
                changes: vec![
                    ("status".to_string(), Value::from(collection.delivered_status())),
                    ("deliveredAt".to_string(), Value::from(stamp.as_str())),
                ],
                counters: Some(DriverCounterDelta {
                    driver_id: driver_id.to_string(),
                    active: -1,
                    completed: 1,
                    earnings,
                }),
            })
            .await?;

        if let Some(profile) = &outcome.driver {
            self.metrics
                .set_active_deliveries(&profile.id, profile.active_deliveries);
        }

        let delivered = normalize(&outcome.record, collection);

        if let Some(order_id) = delivered.originating_order.clone() {
            self.mirror_complete(&order_id, &stamp).await;
        }

        self.send_complete_notifications(&delivered).await;

        info!(job = %delivered.id, driver = %driver_id, "job delivered");
        Ok(delivered)
    }

    /// Best-effort propagation onto the originating order record. The job
    /// document is the source of truth; a failure here is logged and counted,
    /// never surfaced.
    async fn mirror_accept(
        &self,
        order_id: &str,
        driver_id: &str,
        driver: &DriverProfile,
        stamp: &str,
    ) {
        let changes = vec![
            ("status".to_string(), Value::from("inDelivery")),
            ("deliveryStatus".to_string(), Value::from("inDelivery")),
            ("assignedDelivery".to_string(), Value::from(driver_id)),
            ("deliveryName".to_string(), Value::from(driver.name.as_str())),
            ("deliveryPhone".to_string(), Value::from(driver.phone.as_str())),
            ("assignedAt".to_string(), Value::from(stamp)),
        ];

        if let Err(err) = self
            .store
            .conditional_update(SourceCollection::OrderSourced, order_id, Vec::new(), changes)
            .await
        {
            warn!(order = %order_id, error = %err, "mirror write to originating order failed");
            self.metrics.inc_mirror_failure();
        }
    }

    async fn mirror_complete(&self, order_id: &str, stamp: &str) {
        let changes = vec![
            ("status".to_string(), Value::from("delivered")),
            ("deliveredAt".to_string(), Value::from(stamp)),
        ];

        if let Err(err) = self
            .store
            .conditional_update(SourceCollection::OrderSourced, order_id, Vec::new(), changes)
            .await
        {
            warn!(order = %order_id, error = %err, "mirror write to originating order failed");
            self.metrics.inc_mirror_failure();
        }
    }

    async fn send_accept_notifications(&self, job: &DeliveryJob, driver: &DriverProfile) {
        let short_id: String = job.id.chars().take(6).collect();

        if let Some(customer_id) = &job.customer.id {
            let message = format!("{} será tu repartidor y entregará tu pedido pronto.", driver.name);
            self.notify(customer_id, "¡Tu pedido está en camino!", &message, &job.id)
                .await;
        }

        if let Some(company_id) = &job.company.id {
            let message = format!("{} recogerá el pedido #{short_id} para entregarlo.", driver.name);
            self.notify(company_id, "Repartidor asignado", &message, &job.id)
                .await;
        }
    }

    async fn send_complete_notifications(&self, job: &DeliveryJob) {
        let short_id: String = job.id.chars().take(6).collect();

        if let Some(customer_id) = &job.customer.id {
            self.notify(
                customer_id,
                "¡Tu pedido ha sido entregado!",
                "Tu pedido ha sido entregado con éxito.",
                &job.id,
            )
            .await;
        }

        if let Some(company_id) = &job.company.id {
            let message = format!("El pedido #{short_id} ha sido entregado con éxito.");
            self.notify(company_id, "Pedido entregado", &message, &job.id)
                .await;
        }
    }

    async fn notify(&self, recipient: &str, title: &str, message: &str, job_id: &str) {
        if let Err(err) = self
            .notifier
            .notify(recipient, NotificationKind::Delivery, title, message, Some(job_id))
            .await
        {
            warn!(recipient = %recipient, error = %err, "notification delivery failed");
        }
    }
}

fn outcome_label(result: &Result<DeliveryJob, DispatchError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(DispatchError::Conflict(_)) => "conflict",
        Err(DispatchError::PreconditionFailed(_)) => "precondition",
        Err(DispatchError::NotFound(_)) => "not_found",
        Err(_) => "error",
    }
}
