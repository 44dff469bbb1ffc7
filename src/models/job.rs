use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Eta;
use crate::models::driver::GeoPoint;

/// Which raw collection a job was normalized from. Writes must be routed back
/// to the same collection, and each collection spells its fields differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceCollection {
    OrderSourced,
    DeliverySourced,
}

impl SourceCollection {
    pub fn collection_name(&self) -> &'static str {
        match self {
            SourceCollection::OrderSourced => "orders",
            SourceCollection::DeliverySourced => "deliveries",
        }
    }

    /// Raw field that carries the assigned driver in this collection.
    pub fn assignee_field(&self) -> &'static str {
        match self {
            SourceCollection::OrderSourced => "assignedDelivery",
            SourceCollection::DeliverySourced => "driverId",
        }
    }

    /// Raw status value of a job still waiting for a driver.
    pub fn pending_status(&self) -> &'static str {
        match self {
            SourceCollection::OrderSourced => "pendingDelivery",
            SourceCollection::DeliverySourced => "pendingDriver",
        }
    }

    pub fn in_delivery_status(&self) -> &'static str {
        "inDelivery"
    }

    pub fn delivered_status(&self) -> &'static str {
        "delivered"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    PendingDelivery,
    InDelivery,
    Delivered,
    /// Written by outside collaborators; no transition here produces it.
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub id: Option<String>,
    pub name: String,
    pub phone: String,
    pub delivery_address: String,
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInfo {
    pub id: Option<String>,
    pub name: String,
    pub phone: String,
    pub pickup_address: String,
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInfo {
    pub name: String,
    pub description: String,
    pub image: String,
    pub quantity: u32,
}

/// Canonical job shape, reconciled from either source collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJob {
    pub id: String,
    pub source: SourceCollection,
    pub status: JobStatus,
    pub assigned_driver: Option<String>,
    pub title: String,
    pub customer: CustomerInfo,
    pub company: CompanyInfo,
    pub product: ProductInfo,
    /// Amount payable to the driver.
    pub fee: f64,
    /// Full order amount; absent on many records.
    pub total: Option<f64>,
    /// Back-reference to the originating order record, delivery-sourced only.
    pub originating_order: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Derived per view from the driver's live position; never persisted.
    #[serde(skip)]
    pub distance_km: Option<f64>,
    #[serde(skip)]
    pub eta: Option<Eta>,
}

impl DeliveryJob {
    /// Open for acceptance by any driver.
    pub fn is_deliverable(&self) -> bool {
        self.status == JobStatus::PendingDelivery && self.assigned_driver.is_none()
    }

    pub fn assigned_to(&self, driver_id: &str) -> bool {
        self.assigned_driver.as_deref() == Some(driver_id)
    }
}
