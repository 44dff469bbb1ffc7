//! Reconciles raw documents from either source collection into the canonical
//! [`DeliveryJob`] shape. Total by construction: every field resolves through
//! an ordered fallback chain and bottoms out in a default, so a record missing
//! every optional field still normalizes.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::driver::GeoPoint;
use crate::models::job::{
    CompanyInfo, CustomerInfo, DeliveryJob, JobStatus, ProductInfo, SourceCollection,
};
use crate::store::RawRecord;

pub fn normalize(raw: &RawRecord, source: SourceCollection) -> DeliveryJob {
    let fields = &raw.fields;
    let mut prov = Provenance::default();

    let customer_name_chain: &[&'static str] = match source {
        SourceCollection::OrderSourced => &["customerName", "clientName"],
        SourceCollection::DeliverySourced => &["clientName", "customerName"],
    };

    let status = normalize_status(str_value(fields, "status"), source);
    let assigned_driver = assigned_driver(fields, source);

    let job = DeliveryJob {
        id: raw.id.clone(),
        source,
        status,
        assigned_driver,
        title: pick_str(
            fields,
            &["title", "name", "requestName", "requestTitle"],
            "Solicitud sin título",
            &mut prov,
            "title",
        ),
        customer: CustomerInfo {
            id: pick_opt_str(
                fields,
                &["customerId", "requestedBy", "userId"],
                &mut prov,
                "customer.id",
            ),
            name: pick_str(fields, customer_name_chain, "Cliente", &mut prov, "customer.name"),
            phone: pick_str(
                fields,
                &["customerPhone", "clientPhone", "phone"],
                "",
                &mut prov,
                "customer.phone",
            ),
            delivery_address: pick_str(
                fields,
                &["deliveryAddress", "address"],
                "",
                &mut prov,
                "customer.address",
            ),
            coordinates: pick_geo(fields, &["deliveryCoordinates"], &mut prov, "customer.coords"),
        },
        company: CompanyInfo {
            id: pick_opt_str(fields, &["companyId"], &mut prov, "company.id"),
            name: pick_str(
                fields,
                &["companyName", "businessName", "storeName"],
                "Empresa",
                &mut prov,
                "company.name",
            ),
            phone: pick_str(
                fields,
                &["companyPhone", "businessPhone"],
                "",
                &mut prov,
                "company.phone",
            ),
            pickup_address: pick_str(
                fields,
                &["companyAddress", "businessAddress", "storeAddress"],
                "",
                &mut prov,
                "company.address",
            ),
            coordinates: pick_geo(
                fields,
                &["companyCoordinates", "businessCoordinates", "pickupCoordinates"],
                &mut prov,
                "company.coords",
            ),
        },
        product: ProductInfo {
            name: pick_str(
                fields,
                &["productName", "itemName", "item"],
                "Producto",
                &mut prov,
                "product.name",
            ),
            description: pick_str(
                fields,
                &["productDescription", "description", "itemDescription"],
                "",
                &mut prov,
                "product.description",
            ),
            image: pick_str(
                fields,
                &["productImage", "itemImage", "image"],
                "",
                &mut prov,
                "product.image",
            ),
            quantity: pick_number(fields, &["quantity", "productQuantity"], 1.0, &mut prov, "product.quantity")
                .max(0.0) as u32,
        },
        fee: pick_number(
            fields,
            &["deliveryFee", "offeredPrice", "price"],
            0.0,
            &mut prov,
            "fee",
        ),
        total: pick_opt_number(fields, &["total", "orderTotal"], &mut prov, "total"),
        originating_order: match source {
            SourceCollection::DeliverySourced => {
                pick_opt_str(fields, &["orderId"], &mut prov, "originating_order")
            }
            SourceCollection::OrderSourced => None,
        },
        created_at: pick_timestamp(fields, &["createdAt"]),
        accepted_at: pick_timestamp(fields, &["assignedAt"]),
        delivered_at: pick_timestamp(fields, &["deliveredAt"]),
        distance_km: None,
        eta: None,
    };

    debug!(
        job = %job.id,
        collection = source.collection_name(),
        resolved = ?prov.entries,
        "normalized raw record"
    );

    job
}

fn normalize_status(raw: Option<&str>, source: SourceCollection) -> JobStatus {
    match source {
        SourceCollection::OrderSourced => match raw {
            Some("inDelivery") => JobStatus::InDelivery,
            Some("delivered") => JobStatus::Delivered,
            Some("cancelled") => JobStatus::Cancelled,
            _ => JobStatus::PendingDelivery,
        },
        SourceCollection::DeliverySourced => match raw {
            Some("driverAssigned") | Some("inTransit") | Some("inDelivery") => JobStatus::InDelivery,
            Some("delivered") => JobStatus::Delivered,
            Some("cancelled") => JobStatus::Cancelled,
            _ => JobStatus::PendingDelivery,
        },
    }
}

fn assigned_driver(fields: &Map<String, Value>, source: SourceCollection) -> Option<String> {
    let chain: &[&str] = match source {
        SourceCollection::OrderSourced => &["assignedDelivery"],
        SourceCollection::DeliverySourced => &["driverId", "assignedDelivery"],
    };
    chain
        .iter()
        .find_map(|key| str_value(fields, key))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn str_value<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

/// Which raw field supplied each logical value; emitted once per record at
/// debug level for observability only.
#[derive(Default)]
struct Provenance {
    entries: Vec<(&'static str, &'static str)>,
}

impl Provenance {
    fn record(&mut self, logical: &'static str, raw_field: &'static str) {
        self.entries.push((logical, raw_field));
    }
}

fn pick_str(
    fields: &Map<String, Value>,
    candidates: &[&'static str],
    fallback: &str,
    prov: &mut Provenance,
    logical: &'static str,
) -> String {
    for key in candidates.iter().copied() {
        if let Some(value) = str_value(fields, key) {
            if !value.is_empty() {
                prov.record(logical, key);
                return value.to_string();
            }
        }
    }
    prov.record(logical, "default");
    fallback.to_string()
}

fn pick_opt_str(
    fields: &Map<String, Value>,
    candidates: &[&'static str],
    prov: &mut Provenance,
    logical: &'static str,
) -> Option<String> {
    for key in candidates.iter().copied() {
        if let Some(value) = str_value(fields, key) {
            if !value.is_empty() {
                prov.record(logical, key);
                return Some(value.to_string());
            }
        }
    }
    None
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Missing or non-numeric values resolve to the fallback; downstream
/// arithmetic (fee sorting, display formatting) assumes a number.
fn pick_number(
    fields: &Map<String, Value>,
    candidates: &[&'static str],
    fallback: f64,
    prov: &mut Provenance,
    logical: &'static str,
) -> f64 {
    for key in candidates.iter().copied() {
        if let Some(value) = fields.get(key).and_then(numeric) {
            prov.record(logical, key);
            return value;
        }
    }
    prov.record(logical, "default");
    fallback
}

fn pick_opt_number(
    fields: &Map<String, Value>,
    candidates: &[&'static str],
    prov: &mut Provenance,
    logical: &'static str,
) -> Option<f64> {
    for key in candidates.iter().copied() {
        if let Some(value) = fields.get(key).and_then(numeric) {
            prov.record(logical, key);
            return Some(value);
        }
    }
    None
}

fn pick_geo(
    fields: &Map<String, Value>,
    candidates: &[&'static str],
    prov: &mut Provenance,
    logical: &'static str,
) -> Option<GeoPoint> {
    for key in candidates.iter().copied() {
        if let Some(Value::Object(coords)) = fields.get(key) {
            let lat = coords.get("lat").and_then(numeric);
            let lng = coords.get("lng").and_then(numeric);
            if let (Some(lat), Some(lng)) = (lat, lng) {
                prov.record(logical, key);
                return Some(GeoPoint { lat, lng });
            }
        }
    }
    None
}

fn pick_timestamp(fields: &Map<String, Value>, candidates: &[&str]) -> Option<DateTime<Utc>> {
    for key in candidates {
        if let Some(raw) = str_value(fields, key) {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                return Some(parsed.with_timezone(&Utc));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::normalize;
    use crate::models::job::{JobStatus, SourceCollection};
    use crate::store::RawRecord;

    fn record(id: &str, value: serde_json::Value) -> RawRecord {
        let fields = match value {
            serde_json::Value::Object(map) => map,
            _ => Map::new(),
        };
        RawRecord {
            id: id.to_string(),
            fields,
        }
    }

    #[test]
    fn empty_record_resolves_every_fallback_default() {
        let job = normalize(&record("j1", json!({})), SourceCollection::OrderSourced);

        assert_eq!(job.title, "Solicitud sin título");
        assert_eq!(job.customer.name, "Cliente");
        assert_eq!(job.company.name, "Empresa");
        assert_eq!(job.product.name, "Producto");
        assert_eq!(job.product.quantity, 1);
        assert_eq!(job.fee, 0.0);
        assert_eq!(job.total, None);
        assert_eq!(job.status, JobStatus::PendingDelivery);
        assert_eq!(job.assigned_driver, None);
        assert!(job.customer.coordinates.is_none());
        assert!(job.created_at.is_none());
        assert!(job.is_deliverable());
    }

    #[test]
    fn product_name_fallsback_in_order() {
        let job = normalize(
            &record("j1", json!({ "itemName": "Cemento", "item": "Otro" })),
            SourceCollection::OrderSourced,
        );
        assert_eq!(job.product.name, "Cemento");

        let job = normalize(
            &record("j2", json!({ "item": "Arena" })),
            SourceCollection::OrderSourced,
        );
        assert_eq!(job.product.name, "Arena");
    }

    #[test]
    fn customer_name_chain_is_source_aware() {
        let fields = json!({ "customerName": "Ana", "clientName": "Berta" });

        let from_orders = normalize(&record("j1", fields.clone()), SourceCollection::OrderSourced);
        assert_eq!(from_orders.customer.name, "Ana");

        let from_deliveries = normalize(&record("j1", fields), SourceCollection::DeliverySourced);
        assert_eq!(from_deliveries.customer.name, "Berta");
    }

    #[test]
    fn numeric_fields_coerce_from_strings() {
        let job = normalize(
            &record("j1", json!({ "deliveryFee": "12.5", "quantity": "3" })),
            SourceCollection::OrderSourced,
        );
        assert_eq!(job.fee, 12.5);
        assert_eq!(job.product.quantity, 3);
    }

    #[test]
    fn non_numeric_quantity_and_fee_fall_back() {
        let job = normalize(
            &record("j1", json!({ "deliveryFee": {"amount": 5}, "quantity": "muchos" })),
            SourceCollection::OrderSourced,
        );
        assert_eq!(job.fee, 0.0);
        assert_eq!(job.product.quantity, 1);
    }

    #[test]
    fn fee_prefers_delivery_fee_over_offered_price() {
        let job = normalize(
            &record("j1", json!({ "offeredPrice": 8.0, "deliveryFee": 10.0, "price": 6.0 })),
            SourceCollection::OrderSourced,
        );
        assert_eq!(job.fee, 10.0);
    }

    #[test]
    fn delivery_statuses_map_to_canonical_lifecycle() {
        for (raw, expected) in [
            ("pendingDriver", JobStatus::PendingDelivery),
            ("driverAssigned", JobStatus::InDelivery),
            ("inTransit", JobStatus::InDelivery),
            ("inDelivery", JobStatus::InDelivery),
            ("delivered", JobStatus::Delivered),
            ("cancelled", JobStatus::Cancelled),
            ("algoRaro", JobStatus::PendingDelivery),
        ] {
            let job = normalize(
                &record("j1", json!({ "status": raw })),
                SourceCollection::DeliverySourced,
            );
            assert_eq!(job.status, expected, "raw status {raw}");
        }
    }

    #[test]
    fn assignee_field_is_source_specific() {
        let order = normalize(
            &record("j1", json!({ "assignedDelivery": "d-1", "status": "inDelivery" })),
            SourceCollection::OrderSourced,
        );
        assert!(order.assigned_to("d-1"));

        let delivery = normalize(
            &record("j2", json!({ "driverId": "d-2", "status": "driverAssigned" })),
            SourceCollection::DeliverySourced,
        );
        assert!(delivery.assigned_to("d-2"));
    }

    #[test]
    fn timestamps_parse_from_rfc3339() {
        let job = normalize(
            &record(
                "j1",
                json!({
                    "createdAt": "2025-11-03T14:30:00+00:00",
                    "assignedAt": "2025-11-03T15:00:00Z",
                    "deliveredAt": "no es una fecha"
                }),
            ),
            SourceCollection::OrderSourced,
        );
        assert!(job.created_at.is_some());
        assert!(job.accepted_at.is_some());
        assert!(job.delivered_at.is_none());
    }

    #[test]
    fn coordinates_require_both_axes() {
        let job = normalize(
            &record("j1", json!({ "deliveryCoordinates": { "lat": 4.7 } })),
            SourceCollection::OrderSourced,
        );
        assert!(job.customer.coordinates.is_none());

        let job = normalize(
            &record("j2", json!({ "deliveryCoordinates": { "lat": 4.7, "lng": -74.1 } })),
            SourceCollection::OrderSourced,
        );
        let coords = job.customer.coordinates.unwrap();
        assert_eq!(coords.lat, 4.7);
        assert_eq!(coords.lng, -74.1);
    }

    #[test]
    fn originating_order_only_on_delivery_sourced() {
        let fields = json!({ "orderId": "ord-9" });
        let delivery = normalize(&record("j1", fields.clone()), SourceCollection::DeliverySourced);
        assert_eq!(delivery.originating_order.as_deref(), Some("ord-9"));

        let order = normalize(&record("j1", fields), SourceCollection::OrderSourced);
        assert_eq!(order.originating_order, None);
    }
}
