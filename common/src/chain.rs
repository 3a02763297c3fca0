use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction as SolanaTransaction;
use solana_transaction_status::{EncodedTransaction, UiMessage, UiTransactionEncoding};

/// How many recent signatures the polling loop inspects per wallet per cycle.
const SIGNATURE_SCAN_LIMIT: usize = 20;

/// An inbound lamport transfer observed on chain.
#[derive(Debug, Clone)]
pub struct InboundTransfer {
    pub hash: String,
    pub from: String,
    pub lamports: u64,
    pub timestamp: NaiveDateTime,
}

/// Chain collaborator consumed by the executor and the polling loops.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn balance(&self, address: &str) -> anyhow::Result<u64>;

    /// Builds, signs and submits a single lamport transfer funded by the
    /// signer's own balance, returning the transaction hash once confirmed.
    async fn submit_transfer(
        &self,
        signer: &Keypair,
        to: &Pubkey,
        lamports: u64,
    ) -> anyhow::Result<String>;

    /// Recent transfers into `address`, newest first.
    async fn recent_transfers(&self, address: &str) -> anyhow::Result<Vec<InboundTransfer>>;
}

pub struct SolanaChain {
    rpc: RpcClient,
}

impl SolanaChain {
    pub fn new(rpc_url: &str) -> Self {
        SolanaChain {
            rpc: RpcClient::new(rpc_url.to_string()),
        }
    }
}

#[async_trait]
impl ChainClient for SolanaChain {
    async fn balance(&self, address: &str) -> anyhow::Result<u64> {
        let owner = Pubkey::from_str(address)
            .with_context(|| format!("Invalid wallet address {address}"))?;
        let balance = self
            .rpc
            .get_balance(&owner)
            .await
            .with_context(|| format!("Failed to fetch balance for {address}"))?;
        Ok(balance)
    }

    async fn submit_transfer(
        &self,
        signer: &Keypair,
        to: &Pubkey,
        lamports: u64,
    ) -> anyhow::Result<String> {
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .context("Failed to fetch a recent blockhash")?;
        let instruction = system_instruction::transfer(&signer.pubkey(), to, lamports);
        let transaction = SolanaTransaction::new_signed_with_payer(
            &[instruction],
            Some(&signer.pubkey()),
            &[signer],
            blockhash,
        );
        let signature = self
            .rpc
            .send_and_confirm_transaction(&transaction)
            .await
            .context("Failed to submit transfer")?;
        Ok(signature.to_string())
    }

    async fn recent_transfers(&self, address: &str) -> anyhow::Result<Vec<InboundTransfer>> {
        let owner = Pubkey::from_str(address)
            .with_context(|| format!("Invalid wallet address {address}"))?;
        let signatures = self
            .rpc
            .get_signatures_for_address(&owner)
            .await
            .with_context(|| format!("Failed to list signatures for {address}"))?;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        let mut transfers = Vec::new();
        for status in signatures.into_iter().take(SIGNATURE_SCAN_LIMIT) {
            if status.err.is_some() {
                continue;
            }
            let signature = Signature::from_str(&status.signature)
                .with_context(|| format!("Malformed signature {}", status.signature))?;
            let fetched = match self.rpc.get_transaction_with_config(&signature, config).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    log::warn!("Skipping transaction {}: {e:#}", status.signature);
                    continue;
                }
            };

            let Some(meta) = fetched.transaction.meta else {
                continue;
            };
            let EncodedTransaction::Json(ui_transaction) = fetched.transaction.transaction else {
                continue;
            };
            let UiMessage::Raw(message) = ui_transaction.message else {
                continue;
            };
            let Some(index) = message.account_keys.iter().position(|key| key == address) else {
                continue;
            };
            let pre = meta.pre_balances.get(index).copied().unwrap_or(0);
            let post = meta.post_balances.get(index).copied().unwrap_or(0);
            if post <= pre {
                // outbound or neutral for this wallet
                continue;
            }
            let from = message
                .account_keys
                .first()
                .cloned()
                .unwrap_or_default();
            let timestamp = status
                .block_time
                .and_then(|t| DateTime::from_timestamp(t, 0))
                .map(|t| t.naive_utc())
                .unwrap_or_else(|| Utc::now().naive_utc());
            transfers.push(InboundTransfer {
                hash: status.signature,
                from,
                lamports: post - pre,
                timestamp,
            });
        }
        Ok(transfers)
    }
}
