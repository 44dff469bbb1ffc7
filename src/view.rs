//! Presentation-side filtering, sorting, and search over normalized jobs.
//! Pure helpers plus a thin loader that picks the query predicate for the
//! selected tab.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::DispatchError;
use crate::geo::{Eta, distance_km};
use crate::models::driver::GeoPoint;
use crate::models::job::{DeliveryJob, JobStatus, SourceCollection};
use crate::normalize::normalize;
use crate::store::{JobStore, RecordFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Available,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Newest,
    Oldest,
    Nearest,
    Highest,
}

#[derive(Debug, Clone)]
pub struct ViewQuery {
    pub tab: Tab,
    pub sort: SortOrder,
    pub search: Option<String>,
}

pub fn matches_tab(job: &DeliveryJob, tab: Tab, driver_id: &str) -> bool {
    match tab {
        Tab::Available => job.is_deliverable(),
        // Jobs already assigned but still nominally pending stay visible as
        // active; older collaborators wrote that pair.
        Tab::Active => {
            job.assigned_to(driver_id)
                && matches!(
                    job.status,
                    JobStatus::PendingDelivery | JobStatus::InDelivery
                )
        }
        Tab::Completed => job.assigned_to(driver_id) && job.status == JobStatus::Delivered,
    }
}

pub fn matches_search(job: &DeliveryJob, term: &str) -> bool {
    let term = term.to_lowercase();
    if term.is_empty() {
        return true;
    }

    [
        job.customer.name.as_str(),
        job.customer.delivery_address.as_str(),
        job.company.name.as_str(),
        job.product.name.as_str(),
        job.id.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&term))
}

/// Distance and ETA are derived per view from the driver's live position;
/// jobs without customer coordinates keep `None` and sort last under
/// `Nearest`.
pub fn annotate_distances(jobs: &mut [DeliveryJob], position: Option<&GeoPoint>) {
    for job in jobs.iter_mut() {
        job.distance_km = distance_km(position, job.customer.coordinates.as_ref());
        job.eta = job.distance_km.map(Eta::from_distance_km);
    }
}

pub fn sort_jobs(jobs: &mut [DeliveryJob], order: SortOrder) {
    match order {
        SortOrder::Newest => jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::Oldest => jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortOrder::Nearest => jobs.sort_by(|a, b| match (a.distance_km, b.distance_km) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        SortOrder::Highest => jobs.sort_by(|a, b| b.fee.total_cmp(&a.fee)),
    }
}

pub struct DispatchView<S> {
    store: Arc<S>,
    driver_id: String,
}

impl<S: JobStore> DispatchView<S> {
    pub fn new(store: Arc<S>, driver_id: impl Into<String>) -> Self {
        Self {
            store,
            driver_id: driver_id.into(),
        }
    }

    /// One snapshot load for the tab; the live path goes through
    /// `engine::feed`.
    pub async fn load(&self, tab: Tab) -> Result<Vec<DeliveryJob>, DispatchError> {
        let mut jobs = Vec::new();

        for collection in [SourceCollection::OrderSourced, SourceCollection::DeliverySourced] {
            let filter = match tab {
                Tab::Available => {
                    RecordFilter::new().field_eq("status", collection.pending_status())
                }
                Tab::Active | Tab::Completed => RecordFilter::new()
                    .field_eq(collection.assignee_field(), self.driver_id.as_str()),
            };

            let records = self.store.query(collection, &filter).await?;
            jobs.extend(records.iter().map(|record| normalize(record, collection)));
        }

        jobs.retain(|job| matches_tab(job, tab, &self.driver_id));
        Ok(jobs)
    }

    pub async fn render(
        &self,
        query: &ViewQuery,
        position: Option<&GeoPoint>,
    ) -> Result<Vec<DeliveryJob>, DispatchError> {
        let mut jobs = self.load(query.tab).await?;
        annotate_distances(&mut jobs, position);

        if let Some(term) = &query.search {
            jobs.retain(|job| matches_search(job, term));
        }

        sort_jobs(&mut jobs, query.sort);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{SortOrder, Tab, annotate_distances, matches_search, matches_tab, sort_jobs};
    use crate::models::driver::GeoPoint;
    use crate::models::job::{
        CompanyInfo, CustomerInfo, DeliveryJob, JobStatus, ProductInfo, SourceCollection,
    };

    fn job(id: &str, status: JobStatus, assigned: Option<&str>) -> DeliveryJob {
        DeliveryJob {
            id: id.to_string(),
            source: SourceCollection::OrderSourced,
            status,
            assigned_driver: assigned.map(str::to_string),
            title: "Entrega de materiales".to_string(),
            customer: CustomerInfo {
                id: None,
                name: "María Pérez".to_string(),
                phone: "300".to_string(),
                delivery_address: "Calle 45 #12-30".to_string(),
                coordinates: None,
            },
            company: CompanyInfo {
                id: None,
                name: "Ferretería Central".to_string(),
                phone: String::new(),
                pickup_address: String::new(),
                coordinates: None,
            },
            product: ProductInfo {
                name: "Cemento gris".to_string(),
                description: String::new(),
                image: String::new(),
                quantity: 2,
            },
            fee: 0.0,
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
    fn available_tab_requires_pending_and_unassigned() {
        assert!(matches_tab(
            &job("a", JobStatus::PendingDelivery, None),
            Tab::Available,
            "d1"
        ));
        assert!(!matches_tab(
            &job("b", JobStatus::PendingDelivery, Some("d2")),
            Tab::Available,
            "d1"
        ));
        assert!(!matches_tab(
            &job("c", JobStatus::InDelivery, Some("d1")),
            Tab::Available,
            "d1"
        ));
    }

    #[test]
    fn active_tab_includes_assigned_but_still_pending_jobs() {
        assert!(matches_tab(
            &job("a", JobStatus::PendingDelivery, Some("d1")),
            Tab::Active,
            "d1"
        ));
        assert!(matches_tab(
            &job("b", JobStatus::InDelivery, Some("d1")),
            Tab::Active,
            "d1"
        ));
        assert!(!matches_tab(
            &job("c", JobStatus::InDelivery, Some("d2")),
            Tab::Active,
            "d1"
        ));
        assert!(!matches_tab(
            &job("d", JobStatus::Delivered, Some("d1")),
            Tab::Active,
            "d1"
        ));
    }

    #[test]
    fn completed_tab_is_own_delivered_jobs_only() {
        assert!(matches_tab(
            &job("a", JobStatus::Delivered, Some("d1")),
            Tab::Completed,
            "d1"
        ));
        assert!(!matches_tab(
            &job("b", JobStatus::Delivered, Some("d2")),
            Tab::Completed,
            "d1"
        ));
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let job = job("job-778", JobStatus::PendingDelivery, None);

        assert!(matches_search(&job, "maría"));
        assert!(matches_search(&job, "FERRETERÍA"));
        assert!(matches_search(&job, "cemento"));
        assert!(matches_search(&job, "calle 45"));
        assert!(matches_search(&job, "778"));
        assert!(!matches_search(&job, "madera"));
    }

    #[test]
    fn nearest_sort_puts_jobs_without_distance_last() {
        let mut far = job("far", JobStatus::PendingDelivery, None);
        far.customer.coordinates = Some(GeoPoint {
            lat: 4.80,
            lng: -74.00,
        });
        let mut near = job("near", JobStatus::PendingDelivery, None);
        near.customer.coordinates = Some(GeoPoint {
            lat: 4.7111,
            lng: -74.0722,
        });
        let mut unknown = job("unknown", JobStatus::PendingDelivery, None);
        unknown.fee = 12.5;

        let mut jobs = vec![unknown, far, near];
        let here = GeoPoint {
            lat: 4.7110,
            lng: -74.0721,
        };
        annotate_distances(&mut jobs, Some(&here));
        sort_jobs(&mut jobs, SortOrder::Nearest);

        assert_eq!(jobs[0].id, "near");
        assert_eq!(jobs[1].id, "far");
        assert_eq!(jobs[2].id, "unknown");
        assert!(jobs[2].distance_km.is_none());
    }

    #[test]
    fn highest_sort_orders_by_fee_descending() {
        let mut cheap = job("cheap", JobStatus::PendingDelivery, None);
        cheap.fee = 3.0;
        let mut rich = job("rich", JobStatus::PendingDelivery, None);
        rich.fee = 18.0;

        let mut jobs = vec![cheap, rich];
        sort_jobs(&mut jobs, SortOrder::Highest);
        assert_eq!(jobs[0].id, "rich");
    }

    #[test]
    fn newest_sort_orders_by_created_at_descending() {
        let mut older = job("older", JobStatus::PendingDelivery, None);
        older.created_at = Some(Utc.with_ymd_and_hms(2025, 11, 1, 8, 0, 0).unwrap());
        let mut newer = job("newer", JobStatus::PendingDelivery, None);
        newer.created_at = Some(Utc.with_ymd_and_hms(2025, 11, 2, 8, 0, 0).unwrap());
        let undated = job("undated", JobStatus::PendingDelivery, None);

        let mut jobs = vec![older, undated, newer];
        sort_jobs(&mut jobs, SortOrder::Newest);
        assert_eq!(jobs[0].id, "newer");
        assert_eq!(jobs[1].id, "older");
        assert_eq!(jobs[2].id, "undated");

        sort_jobs(&mut jobs, SortOrder::Oldest);
        assert_eq!(jobs[0].id, "undated");
        assert_eq!(jobs[1].id, "older");
    }
}
