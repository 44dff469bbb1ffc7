use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Delivery,
    Proposal,
    System,
}

/// Owned by the notification collaborator; this core only triggers creation
/// through the sink and reads its own recipient's feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub delivery_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
