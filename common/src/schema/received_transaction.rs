use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// An inbound transfer discovered by the chain polling loop and mirrored to
/// the wallet's received-transactions container. Deduplicated per wallet by
/// `transaction_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReceivedTransaction {
    pub id: i64,
    pub wallet_id: String,
    pub from_address: String,
    pub amount: String,
    pub token_name: String,
    pub transaction_hash: String,
    pub date: NaiveDateTime,
    pub status: String,
    pub notion_page_id: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}
