//! Driver availability, decoupled from job state. A driver mid-delivery can
//! report a break to stop receiving new work without touching the job.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::models::driver::{DriverProfile, DriverStatus, GeoPoint};
use crate::models::job::{JobStatus, SourceCollection};
use crate::normalize::normalize;
use crate::store::{JobStore, RecordFilter};

pub struct DriverStatusService<S> {
    store: Arc<S>,
}

impl<S: JobStore> DriverStatusService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Always settable by the owning driver; no transition constraints.
    pub async fn set_status(
        &self,
        driver_id: &str,
        status: DriverStatus,
    ) -> Result<DriverProfile, DispatchError> {
        let profile = self
            .store
            .set_driver_status(driver_id, status, Utc::now())
            .await?;

        info!(driver = %driver_id, status = profile.status.as_str(), "driver status updated");
        Ok(profile)
    }

    pub async fn status_of(&self, driver_id: &str) -> Result<DriverStatus, DispatchError> {
        let profile = self
            .store
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("driver {driver_id} not found")))?;
        Ok(profile.status)
    }

    /// The acceptance gate.
    pub async fn can_accept(&self, driver_id: &str) -> Result<bool, DispatchError> {
        Ok(self.status_of(driver_id).await?.permits_accept())
    }

    /// Writes the fresh position to the profile and mirrors it onto the
    /// driver's in-flight jobs so tracking views stay current. Job mirrors are
    /// best effort.
    pub async fn update_location(
        &self,
        driver_id: &str,
        position: GeoPoint,
    ) -> Result<DriverProfile, DispatchError> {
        let now = Utc::now();
        let profile = self
            .store
            .set_driver_location(driver_id, position, now)
            .await?;

        let location_field: Value = json!({
            "lat": position.lat,
            "lng": position.lng,
            "lastUpdated": now.to_rfc3339(),
        });

        for collection in [SourceCollection::OrderSourced, SourceCollection::DeliverySourced] {
            let filter = RecordFilter::new().field_eq(collection.assignee_field(), driver_id);
            let records = self.store.query(collection, &filter).await?;

            for record in records {
                let job = normalize(&record, collection);
                if job.status != JobStatus::InDelivery {
                    continue;
                }

                let changes = vec![("driverLocation".to_string(), location_field.clone())];
                if let Err(err) = self
                    .store
                    .conditional_update(collection, &record.id, Vec::new(), changes)
                    .await
                {
                    warn!(job = %record.id, error = %err, "failed to mirror driver location");
                }
            }
        }

        Ok(profile)
    }
}
