use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::job::SourceCollection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

/// A driver's counter-offer on a still-unassigned job. Resolution happens on
/// the customer side, outside this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeProposal {
    pub id: String,
    pub job_id: String,
    pub source: SourceCollection,
    pub driver_id: String,
    pub driver_name: String,
    pub proposed_fee: f64,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
}
