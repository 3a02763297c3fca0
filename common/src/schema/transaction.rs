use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Success => "Success",
            TransactionStatus::Failed => "Failed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(TransactionStatus::Pending),
            "Success" => Ok(TransactionStatus::Success),
            "Failed" => Ok(TransactionStatus::Failed),
            other => Err(anyhow::anyhow!("unknown transaction status: {other}")),
        }
    }
}

/// Ledger record of a submitted chain transfer. `notion_page_id` correlates
/// the transfer back to the scheduled-transaction page that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: i64,
    pub hash: String,
    pub from_address: String,
    pub to_address: String,
    pub value: String,
    pub status: TransactionStatus,
    pub wallet_id: String,
    pub notion_page_id: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl Transaction {
    pub fn new(
        hash: String,
        from_address: String,
        to_address: String,
        value: String,
        status: TransactionStatus,
        wallet_id: String,
        notion_page_id: Option<String>,
    ) -> Self {
        Transaction {
            id: 0, // set by the database
            hash,
            from_address,
            to_address,
            value,
            status,
            wallet_id,
            notion_page_id,
            created_at: None,
        }
    }
}
