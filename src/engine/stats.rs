//! Driver aggregates derived from job history. The per-transition counter
//! deltas keep the profile current in the common case; this module is the
//! repair path — counters recomputed from the records themselves are
//! authoritative and overwrite whatever drifted.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::DispatchError;
use crate::models::driver::DriverProfile;
use crate::models::job::{DeliveryJob, JobStatus, SourceCollection};
use crate::normalize::normalize;
use crate::store::{JobStore, RecordFilter};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStats {
    pub active_deliveries: u32,
    pub completed_deliveries: u32,
    pub cancelled_deliveries: u32,
    pub total_earnings: f64,
    pub today_earnings: f64,
    pub weekly_earnings: f64,
}

pub fn compute_stats(jobs: &[DeliveryJob], driver_id: &str, now: DateTime<Utc>) -> DriverStats {
    let mut stats = DriverStats::default();
    let week_ago = now - Duration::days(7);

    for job in jobs.iter().filter(|job| job.assigned_to(driver_id)) {
        match job.status {
            // An assigned job still nominally pending counts as active, the
            // same way the workload view treats it.
            JobStatus::PendingDelivery | JobStatus::InDelivery => {
                stats.active_deliveries += 1;
            }
            JobStatus::Delivered => {
                stats.completed_deliveries += 1;
                stats.total_earnings += job.fee;

                if let Some(delivered_at) = job.delivered_at {
                    if delivered_at.date_naive() == now.date_naive() {
                        stats.today_earnings += job.fee;
                    }
                    if delivered_at >= week_ago {
                        stats.weekly_earnings += job.fee;
                    }
                }
            }
            JobStatus::Cancelled => {
                stats.cancelled_deliveries += 1;
            }
        }
    }

    stats
}

/// Re-derives `activeDeliveries`/`totalDeliveries` from both collections and
/// writes them back. Run periodically or after a counter write was lost.
pub async fn reconcile_driver_counters<S: JobStore>(
    store: &S,
    driver_id: &str,
) -> Result<DriverProfile, DispatchError> {
    let mut jobs = Vec::new();
    for collection in [SourceCollection::OrderSourced, SourceCollection::DeliverySourced] {
        let filter = RecordFilter::new().field_eq(collection.assignee_field(), driver_id);
        let records = store.query(collection, &filter).await?;
        jobs.extend(records.iter().map(|record| normalize(record, collection)));
    }

    let stats = compute_stats(&jobs, driver_id, Utc::now());
    store
        .set_driver_counters(driver_id, stats.active_deliveries, stats.completed_deliveries)
        .await
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::compute_stats;
    use crate::models::job::{
        CompanyInfo, CustomerInfo, DeliveryJob, JobStatus, ProductInfo, SourceCollection,
    };

    fn job(id: &str, status: JobStatus, assigned: Option<&str>, fee: f64) -> DeliveryJob {
        DeliveryJob {
            id: id.to_string(),
            source: SourceCollection::OrderSourced,
            status,
            assigned_driver: assigned.map(str::to_string),
            title: "Entrega".to_string(),
            customer: CustomerInfo {
                id: None,
                name: "Cliente".to_string(),
                phone: String::new(),
                delivery_address: String::new(),
                coordinates: None,
            },
            company: CompanyInfo {
                id: None,
                name: "Empresa".to_string(),
                phone: String::new(),
                pickup_address: String::new(),
                coordinates: None,
            },
            product: ProductInfo {
                name: "Producto".to_string(),
                description: String::new(),
                image: String::new(),
                quantity: 1,
            },
            fee,
            total: None,
            originating_order: None,
            created_at: None,
            accepted_at: None,
            delivered_at: None,
            distance_km: None,
            eta: None,
        }
    }

    #[test]
    fn stats_bucket_jobs_by_status_and_ownership() {
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 12, 0, 0).unwrap();

        let mut delivered_today = job("a", JobStatus::Delivered, Some("d1"), 10.0);
        delivered_today.delivered_at = Some(now - Duration::hours(2));

        let mut delivered_last_week = job("b", JobStatus::Delivered, Some("d1"), 5.0);
        delivered_last_week.delivered_at = Some(now - Duration::days(3));

        let mut delivered_long_ago = job("c", JobStatus::Delivered, Some("d1"), 7.0);
        delivered_long_ago.delivered_at = Some(now - Duration::days(30));

        let jobs = vec![
            delivered_today,
            delivered_last_week,
            delivered_long_ago,
            job("d", JobStatus::InDelivery, Some("d1"), 4.0),
            job("e", JobStatus::PendingDelivery, Some("d1"), 4.0),
            job("f", JobStatus::Cancelled, Some("d1"), 4.0),
            job("g", JobStatus::Delivered, Some("other"), 99.0),
            job("h", JobStatus::PendingDelivery, None, 1.0),
        ];

        let stats = compute_stats(&jobs, "d1", now);
        assert_eq!(stats.active_deliveries, 2);
        assert_eq!(stats.completed_deliveries, 3);
        assert_eq!(stats.cancelled_deliveries, 1);
        assert_eq!(stats.total_earnings, 22.0);
        assert_eq!(stats.today_earnings, 10.0);
        assert_eq!(stats.weekly_earnings, 15.0);
    }
}
