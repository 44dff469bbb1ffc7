//! Bounded-range fee counter-offers. A driver may suggest a different fee for
//! a still-open job; resolution (accept/reject) happens on the customer side,
//! outside this core.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{DispatchError, Precondition};
use crate::models::driver::DriverProfile;
use crate::models::job::SourceCollection;
use crate::models::notification::NotificationKind;
use crate::models::proposal::{FeeProposal, ProposalStatus};
use crate::normalize::normalize;
use crate::store::{JobStore, NotificationSink};

#[derive(Debug, Clone)]
pub struct ProposalPolicy {
    pub floor_ratio: f64,
    pub ceiling_ratio: f64,
}

impl ProposalPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            floor_ratio: config.fee_floor_ratio,
            ceiling_ratio: config.fee_ceiling_ratio,
        }
    }

    /// Allowed band around the listed fee; unbounded when the job carries no
    /// listed fee.
    pub fn bounds(&self, listed_fee: f64) -> Option<(f64, f64)> {
        (listed_fee > 0.0).then(|| (listed_fee * self.floor_ratio, listed_fee * self.ceiling_ratio))
    }

    fn permits(&self, listed_fee: f64, proposed: f64) -> bool {
        if proposed <= 0.0 {
            return false;
        }
        match self.bounds(listed_fee) {
            Some((floor, ceiling)) => proposed >= floor && proposed <= ceiling,
            None => true,
        }
    }
}

pub async fn propose_fee<S: JobStore, N: NotificationSink>(
    store: &S,
    notifier: &N,
    policy: &ProposalPolicy,
    collection: SourceCollection,
    job_id: &str,
    driver: &DriverProfile,
    proposed_fee: f64,
) -> Result<FeeProposal, DispatchError> {
    let raw = store.get(collection, job_id).await?.ok_or_else(|| {
        DispatchError::NotFound(format!("{} {job_id} not found", collection.collection_name()))
    })?;

    let job = normalize(&raw, collection);
    if !job.is_deliverable() {
        return Err(DispatchError::Conflict(
            "job is no longer open for proposals".to_string(),
        ));
    }

    if !policy.permits(job.fee, proposed_fee) {
        return Err(DispatchError::PreconditionFailed(Precondition::FeeOutOfRange));
    }

    let proposal = FeeProposal {
        id: Uuid::new_v4().to_string(),
        job_id: job_id.to_string(),
        source: collection,
        driver_id: driver.id.clone(),
        driver_name: driver.name.clone(),
        proposed_fee,
        status: ProposalStatus::Pending,
        created_at: Utc::now(),
    };

    store.add_proposal(proposal.clone()).await?;

    if let Some(customer_id) = &job.customer.id {
        let message = format!(
            "{} ha propuesto entregar tu pedido por ${proposed_fee:.2}",
            driver.name
        );
        let _ = notifier
            .notify(
                customer_id,
                NotificationKind::Proposal,
                "Nueva propuesta de entrega",
                &message,
                Some(job_id),
            )
            .await;
    }

    info!(job = %job_id, driver = %driver.id, fee = proposed_fee, "fee proposed");
    Ok(proposal)
}

#[cfg(test)]
mod tests {
    use super::ProposalPolicy;

    fn policy() -> ProposalPolicy {
        ProposalPolicy {
            floor_ratio: 0.5,
            ceiling_ratio: 2.0,
        }
    }

    #[test]
    fn bounds_scale_with_listed_fee() {
        assert_eq!(policy().bounds(10.0), Some((5.0, 20.0)));
        assert_eq!(policy().bounds(0.0), None);
    }

    #[test]
    fn permits_enforces_band_and_positivity() {
        let policy = policy();
        assert!(policy.permits(10.0, 5.0));
        assert!(policy.permits(10.0, 20.0));
        assert!(!policy.permits(10.0, 4.9));
        assert!(!policy.permits(10.0, 25.0));
        assert!(!policy.permits(0.0, -1.0));
        // no listed fee: any positive amount is a valid opening offer
        assert!(policy.permits(0.0, 7.5));
    }
}
