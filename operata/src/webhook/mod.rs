pub mod router;
pub mod sync;

use serde::Deserialize;

pub const PROP_TRANSACTION_NAME: &str = "Transaction Name";
pub const PROP_TO_ADDRESS: &str = "To Address";
pub const PROP_AMOUNT: &str = "Amount";
pub const PROP_SCHEDULE_DATE: &str = "Schedule Date";
pub const PROP_ADMIN_STATUS: &str = "Admin Status";
pub const PROP_OPERATA_STATUS: &str = "Operata Status";

/// Inbound webhook delivery. Senders may redeliver, so everything downstream
/// of this type must be idempotent.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub entity: Option<Entity>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub id: String,
    #[serde(rename = "type")]
    pub author_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl WebhookEvent {
    /// True when the event was produced solely by bots, i.e. by our own
    /// status write-backs. Acting on those would loop the pipeline back into
    /// itself.
    pub fn is_bot_only(&self) -> bool {
        !self.authors.is_empty() && self.authors.iter().all(|a| a.author_type == "bot")
    }
}
