use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{ReceivedTransaction, Wallet};
use serde_json::json;

use crate::state::AppState;
use crate::webhook::{PROP_AMOUNT, PROP_TRANSACTION_NAME};

const SYNC_INTERVAL: Duration = Duration::from_secs(30);
const RECEIVED_TOKEN_NAME: &str = "SOL";

/// Spawns the periodic balance-sync and inbound-transfer polling loops. Both
/// run for the lifetime of the process and isolate per-wallet failures so one
/// broken wallet cannot starve the rest.
pub fn start(state: Arc<AppState>) {
    let balances = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SYNC_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = sync_balances_once(&balances).await {
                log::error!("Balance sync pass failed: {e:#}");
            }
        }
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SYNC_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = poll_transactions_once(&state).await {
                log::error!("Transaction polling pass failed: {e:#}");
            }
        }
    });

    log::info!(
        "Started balance and transaction monitors at {}s intervals",
        SYNC_INTERVAL.as_secs()
    );
}

/// One balance-sync pass over every wallet.
pub async fn sync_balances_once(state: &Arc<AppState>) -> anyhow::Result<()> {
    let wallets = state.db.get_wallets().await?;
    for wallet in &wallets {
        if let Err(e) = sync_wallet_balance(state, wallet).await {
            log::error!("Failed to sync balance for wallet {}: {e:#}", wallet.id);
        }
    }
    Ok(())
}

async fn sync_wallet_balance(state: &Arc<AppState>, wallet: &Wallet) -> anyhow::Result<()> {
    let balance = state.chain.balance(&wallet.address).await?;
    state
        .db
        .update_wallet_balance(&wallet.id, balance as i64, Utc::now().naive_utc())
        .await?;
    log::debug!("Wallet {} balance is {balance} lamports", wallet.id);
    Ok(())
}

/// One polling pass: scans recent chain activity per wallet and mirrors
/// previously unseen inbound transfers into the received-transactions
/// container.
pub async fn poll_transactions_once(state: &Arc<AppState>) -> anyhow::Result<()> {
    let wallets = state.db.get_wallets().await?;
    for wallet in &wallets {
        if let Err(e) = poll_wallet_transactions(state, wallet).await {
            log::error!(
                "Failed to poll transactions for wallet {}: {e:#}",
                wallet.id
            );
        }
    }
    Ok(())
}

async fn poll_wallet_transactions(state: &Arc<AppState>, wallet: &Wallet) -> anyhow::Result<()> {
    let transfers = state.chain.recent_transfers(&wallet.address).await?;
    if transfers.is_empty() {
        return Ok(());
    }
    let workspace = state.workspace_for_wallet(wallet).await?;

    for transfer in &transfers {
        if state
            .db
            .received_transaction_exists(&wallet.id, &transfer.hash)
            .await?
        {
            continue;
        }

        // Page first, then the row. A failed page write leaves the hash
        // unrecorded so the next pass retries the whole transfer.
        let notion_page_id = match &wallet.received_db_id {
            Some(database_id) => {
                let page = state
                    .pages
                    .create_page(
                        &workspace.notion_token,
                        database_id,
                        received_page_properties(transfer),
                    )
                    .await?;
                Some(page.id)
            }
            None => None,
        };

        let received = ReceivedTransaction {
            id: 0,
            wallet_id: wallet.id.clone(),
            from_address: transfer.from.clone(),
            amount: transfer.lamports.to_string(),
            token_name: RECEIVED_TOKEN_NAME.to_string(),
            transaction_hash: transfer.hash.clone(),
            date: transfer.timestamp,
            status: "Received".to_string(),
            notion_page_id,
            created_at: None,
        };
        state.db.save_received_transaction(&received).await?;
        log::info!(
            "Recorded inbound transfer {} of {} lamports to wallet {}",
            transfer.hash,
            transfer.lamports,
            wallet.id
        );
    }
    Ok(())
}

fn received_page_properties(transfer: &common::InboundTransfer) -> serde_json::Value {
    json!({
        PROP_TRANSACTION_NAME: {
            "title": [{ "text": { "content": transfer.hash } }]
        },
        "From Address": {
            "rich_text": [{ "text": { "content": transfer.from } }]
        },
        PROP_AMOUNT: { "number": transfer.lamports },
        "Date": {
            "date": { "start": transfer.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string() }
        },
        "Token": { "select": { "name": RECEIVED_TOKEN_NAME } },
    })
}
