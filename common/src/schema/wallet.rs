use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A custodial wallet. `balance` is a cached lamport balance refreshed by the
/// periodic sync loop; the signing key lives in `key_pairs` as an encrypted
/// envelope and is never part of this row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Wallet {
    pub id: String,
    pub workspace_id: String,
    pub address: String,
    pub chain_type: String,
    pub balance: i64,
    pub last_sync_at: Option<NaiveDateTime>,
    pub schedule_db_id: Option<String>,
    pub transactions_db_id: Option<String>,
    pub nfts_db_id: Option<String>,
    pub received_db_id: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Which per-purpose container of a wallet an inbound page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerLane {
    ScheduledTransaction,
    Transaction,
    Nft,
    ReceivedTransaction,
}

impl Wallet {
    pub fn new(
        workspace_id: &str,
        address: &str,
        chain_type: &str,
        schedule_db_id: Option<String>,
        transactions_db_id: Option<String>,
        nfts_db_id: Option<String>,
        received_db_id: Option<String>,
    ) -> Self {
        Wallet {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: workspace_id.to_string(),
            address: address.to_string(),
            chain_type: chain_type.to_string(),
            balance: 0,
            last_sync_at: None,
            schedule_db_id,
            transactions_db_id,
            nfts_db_id,
            received_db_id,
            created_at: None,
            updated_at: None,
        }
    }

    /// Matches a parent database id against this wallet's per-purpose
    /// container ids.
    pub fn lane_for_container(&self, database_id: &str) -> Option<ContainerLane> {
        if self.schedule_db_id.as_deref() == Some(database_id) {
            Some(ContainerLane::ScheduledTransaction)
        } else if self.transactions_db_id.as_deref() == Some(database_id) {
            Some(ContainerLane::Transaction)
        } else if self.nfts_db_id.as_deref() == Some(database_id) {
            Some(ContainerLane::Nft)
        } else if self.received_db_id.as_deref() == Some(database_id) {
            Some(ContainerLane::ReceivedTransaction)
        } else {
            None
        }
    }
}

/// Key material row for a wallet. `private_key` is the base64 envelope blob
/// produced by the vault, never plaintext.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KeyPair {
    pub wallet_id: String,
    pub public_key: String,
    pub private_key: String,
    pub created_at: Option<NaiveDateTime>,
}
