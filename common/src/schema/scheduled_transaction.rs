use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// External approval gate, set by the operator on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum AdminStatus {
    Scheduled,
    Approved,
}

impl AdminStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminStatus::Scheduled => "Scheduled",
            AdminStatus::Approved => "Approved",
        }
    }
}

impl FromStr for AdminStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(AdminStatus::Scheduled),
            "Approved" => Ok(AdminStatus::Approved),
            other => Err(anyhow::anyhow!("unknown admin status: {other}")),
        }
    }
}

/// The pipeline's own execution-lifecycle status. `Completed` and `Failed`
/// are terminal: once reached, external edits are reconciled back, never
/// applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum OperataStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OperataStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperataStatus::Completed | OperataStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperataStatus::Pending => "Pending",
            OperataStatus::Processing => "Processing",
            OperataStatus::Completed => "Completed",
            OperataStatus::Failed => "Failed",
        }
    }
}

impl FromStr for OperataStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OperataStatus::Pending),
            "Processing" => Ok(OperataStatus::Processing),
            "Completed" => Ok(OperataStatus::Completed),
            "Failed" => Ok(OperataStatus::Failed),
            other => Err(anyhow::anyhow!("unknown operata status: {other}")),
        }
    }
}

/// A transfer scheduled from a document-store page, keyed by the page that
/// owns it. `amount` is a decimal string of base units.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduledTransaction {
    pub id: i64,
    pub notion_page_id: String,
    pub wallet_id: String,
    pub transaction_name: String,
    pub to_address: String,
    pub amount: String,
    pub schedule_date: NaiveDateTime,
    pub admin_status: AdminStatus,
    pub operata_status: OperataStatus,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}
