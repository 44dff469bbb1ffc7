//! Live job pools. Each feed merges the push subscriptions of both source
//! collections, normalizes every snapshot, and emits the combined canonical
//! list. Consumers drop the stream to cancel.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::models::job::{DeliveryJob, SourceCollection};
use crate::normalize::normalize;
use crate::observability::metrics::Metrics;
use crate::store::{JobStore, RawRecord, RecordFilter, SnapshotStream};

/// The pool of deliverable jobs every driver browses: pending in either
/// collection and not yet claimed.
pub fn available_jobs<S: JobStore>(
    store: &S,
    queue_size: usize,
    metrics: Option<Metrics>,
) -> ReceiverStream<Vec<DeliveryJob>> {
    let orders = store.subscribe(
        SourceCollection::OrderSourced,
        RecordFilter::new().field_eq("status", SourceCollection::OrderSourced.pending_status()),
    );
    let deliveries = store.subscribe(
        SourceCollection::DeliverySourced,
        RecordFilter::new().field_eq("status", SourceCollection::DeliverySourced.pending_status()),
    );

    merged_pool(orders, deliveries, queue_size, metrics, |job| {
        job.is_deliverable()
    })
}

/// Everything currently assigned to one driver, across both collections.
pub fn driver_jobs<S: JobStore>(
    store: &S,
    driver_id: &str,
    queue_size: usize,
) -> ReceiverStream<Vec<DeliveryJob>> {
    let owner = driver_id.to_string();
    let orders = store.subscribe(
        SourceCollection::OrderSourced,
        RecordFilter::new().field_eq(
            SourceCollection::OrderSourced.assignee_field(),
            driver_id,
        ),
    );
    let deliveries = store.subscribe(
        SourceCollection::DeliverySourced,
        RecordFilter::new().field_eq(
            SourceCollection::DeliverySourced.assignee_field(),
            driver_id,
        ),
    );

    merged_pool(orders, deliveries, queue_size, None, move |job| {
        job.assigned_to(&owner)
    })
}

fn merged_pool<F>(
    orders: SnapshotStream,
    deliveries: SnapshotStream,
    queue_size: usize,
    metrics: Option<Metrics>,
    keep: F,
) -> ReceiverStream<Vec<DeliveryJob>>
where
    F: Fn(&DeliveryJob) -> bool + Send + 'static,
{
    let (tx, rx) = mpsc::channel(queue_size.max(1));

    let mut merged = futures::stream::select(
        orders.map(|records| (SourceCollection::OrderSourced, records)),
        deliveries.map(|records| (SourceCollection::DeliverySourced, records)),
    );

    tokio::spawn(async move {
        let mut latest_orders: Vec<RawRecord> = Vec::new();
        let mut latest_deliveries: Vec<RawRecord> = Vec::new();

        while let Some((source, records)) = merged.next().await {
            match source {
                SourceCollection::OrderSourced => latest_orders = records,
                SourceCollection::DeliverySourced => latest_deliveries = records,
            }

            let jobs: Vec<DeliveryJob> = latest_orders
                .iter()
                .map(|record| normalize(record, SourceCollection::OrderSourced))
                .chain(
                    latest_deliveries
                        .iter()
                        .map(|record| normalize(record, SourceCollection::DeliverySourced)),
                )
                .filter(|job| keep(job))
                .collect();

            if let Some(metrics) = &metrics {
                metrics.set_jobs_available(jobs.len());
            }

            if tx.send(jobs).await.is_err() {
                break;
            }
        }
    });

    ReceiverStream::new(rx)
}
