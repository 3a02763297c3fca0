use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OperataStatus, Transaction, TransactionStatus, Wallet, Workspace};
use solana_sdk::pubkey::Pubkey;

use crate::queue::{JobError, JobProcessor, QueueJob, ScheduledTransactionJob};
use crate::state::AppState;

/// Executes approved scheduled transfers pulled from the queue: resolves the
/// wallet, opens its signing key, submits the transfer and records the
/// outcome in the ledger, mirroring the terminal status to the page.
pub struct TransactionExecutor {
    state: Arc<AppState>,
}

impl TransactionExecutor {
    pub fn new(state: Arc<AppState>) -> Self {
        TransactionExecutor { state }
    }

    async fn resolve_wallet(&self, wallet_id: &str) -> Result<(Wallet, Workspace), JobError> {
        let wallet = self
            .state
            .db
            .get_wallet(wallet_id)
            .await
            .map_err(JobError::Retryable)?
            .ok_or_else(|| JobError::Fatal(anyhow::anyhow!("Wallet {wallet_id} not found")))?;
        let workspace = self
            .state
            .workspace_for_wallet(&wallet)
            .await
            .map_err(JobError::Fatal)?;
        Ok((wallet, workspace))
    }

    async fn execute(&self, job: &ScheduledTransactionJob) -> Result<(), JobError> {
        // Redelivery guard: a terminal row means this job already ran to
        // completion (or was failed); executing again would double-spend.
        let scheduled = self
            .state
            .db
            .get_scheduled_by_page(&job.page_id)
            .await
            .map_err(JobError::Retryable)?
            .ok_or_else(|| {
                JobError::Fatal(anyhow::anyhow!(
                    "No scheduled transaction for page {}",
                    job.page_id
                ))
            })?;
        if scheduled.operata_status.is_terminal() {
            log::info!(
                "Skipping job for page {}: already {}",
                job.page_id,
                scheduled.operata_status.as_str()
            );
            return Ok(());
        }

        let (wallet, workspace) = self.resolve_wallet(&job.wallet_id).await?;

        let key_pair = self
            .state
            .db
            .get_key_pair(&wallet.id)
            .await
            .map_err(JobError::Retryable)?
            .ok_or_else(|| {
                JobError::Fatal(anyhow::anyhow!("No key pair for wallet {}", wallet.id))
            })?;
        // custody failures are final: retrying identical ciphertext cannot succeed
        let signer = self
            .state
            .vault
            .signing_keypair(&key_pair.private_key)
            .map_err(|e| JobError::Fatal(anyhow::anyhow!("Custody failure: {e}")))?;

        let to = Pubkey::from_str(&job.to_address).map_err(|_| {
            JobError::Fatal(anyhow::anyhow!("Invalid destination address {}", job.to_address))
        })?;
        let lamports: u64 = job.amount.parse().map_err(|_| {
            JobError::Fatal(anyhow::anyhow!(
                "Amount `{}` is not a whole number of base units",
                job.amount
            ))
        })?;

        let hash = self
            .state
            .chain
            .submit_transfer(&signer, &to, lamports)
            .await
            .map_err(JobError::Retryable)?;

        log::info!(
            "Transferred {lamports} lamports from {} to {} (tx {hash})",
            wallet.address,
            job.to_address
        );

        // The transfer is on chain: from here on, never hand the job back to
        // the queue. Record-keeping failures are logged and healed by the
        // next sync pass.
        let ledger_row = Transaction::new(
            hash,
            wallet.address.clone(),
            job.to_address.clone(),
            job.amount.clone(),
            TransactionStatus::Success,
            wallet.id.clone(),
            Some(job.page_id.clone()),
        );
        if let Err(e) = self.state.db.save_transaction(&ledger_row).await {
            log::error!("Failed to record ledger row for page {}: {e:#}", job.page_id);
        }
        if let Err(e) = self
            .state
            .db
            .set_operata_status_by_page(&job.page_id, OperataStatus::Completed)
            .await
        {
            log::error!("Failed to mark page {} completed: {e:#}", job.page_id);
        }
        self.state
            .mirror_operata_status(&workspace.notion_token, &job.page_id, OperataStatus::Completed)
            .await;
        Ok(())
    }

    /// Terminal-fail path: the store is updated first, the page mirror is
    /// best-effort.
    async fn mark_failed(&self, job: &ScheduledTransactionJob) {
        if let Err(e) = self
            .state
            .db
            .set_operata_status_by_page(&job.page_id, OperataStatus::Failed)
            .await
        {
            log::error!("Failed to mark page {} failed: {e:#}", job.page_id);
            return;
        }
        match self.state.db.get_wallet(&job.wallet_id).await {
            Ok(Some(wallet)) => match self.state.workspace_for_wallet(&wallet).await {
                Ok(workspace) => {
                    self.state
                        .mirror_operata_status(
                            &workspace.notion_token,
                            &job.page_id,
                            OperataStatus::Failed,
                        )
                        .await;
                }
                Err(e) => log::error!("Cannot mirror failure for page {}: {e:#}", job.page_id),
            },
            Ok(None) => log::error!(
                "Cannot mirror failure for page {}: wallet {} not found",
                job.page_id,
                job.wallet_id
            ),
            Err(e) => log::error!("Cannot mirror failure for page {}: {e:#}", job.page_id),
        }
    }
}

#[async_trait]
impl JobProcessor for TransactionExecutor {
    async fn process(&self, job: &QueueJob) -> Result<(), JobError> {
        match job {
            QueueJob::ScheduledTransaction(job) => self.execute(job).await,
        }
    }

    async fn exhausted(&self, job: &QueueJob, error: &JobError) {
        match job {
            QueueJob::ScheduledTransaction(job) => {
                log::error!(
                    "Scheduled transaction for page {} ended terminally failed: {error:#}",
                    job.page_id
                );
                self.mark_failed(job).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{TestHarness, harness};
    use chrono::Utc;
    use common::AdminStatus;

    const DEST: &str = "9ZNTfG4NyQgxy2SWjSiQoUyBPEvXT2xo7fKc5hPYYJ7z";

    async fn approved_row(h: &TestHarness, page_id: &str, amount: &str) -> ScheduledTransactionJob {
        h.state
            .db
            .upsert_scheduled(
                page_id,
                &h.wallet.id,
                "Rent",
                DEST,
                amount,
                Utc::now().naive_utc(),
                AdminStatus::Approved,
                OperataStatus::Processing,
            )
            .await
            .unwrap();
        ScheduledTransactionJob {
            page_id: page_id.to_string(),
            wallet_id: h.wallet.id.clone(),
            to_address: DEST.to_string(),
            amount: amount.to_string(),
            schedule_date: Utc::now().naive_utc(),
            transaction_name: "Rent".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_transfer_completes_and_records_the_ledger() {
        let h = harness().await;
        let executor = TransactionExecutor::new(h.state.clone());
        let job = approved_row(&h, "page-1", "1000000").await;

        executor.execute(&job).await.unwrap();

        assert_eq!(
            h.chain.submitted.lock().unwrap().as_slice(),
            &[(DEST.to_string(), 1_000_000)]
        );
        let row = h
            .state
            .db
            .get_scheduled_by_page("page-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.operata_status, OperataStatus::Completed);

        let ledger = h
            .state
            .db
            .get_transactions_by_page("page-1")
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].from_address, h.wallet.address);
        assert_eq!(ledger[0].value, "1000000");

        let writes = h.pages.property_writes.lock().unwrap();
        assert!(writes.iter().any(|(page_id, props)| {
            page_id == "page-1"
                && props.contains(&("Operata Status".to_string(), "Completed".to_string()))
        }));
    }

    #[tokio::test]
    async fn redelivered_completed_job_never_touches_the_chain() {
        let h = harness().await;
        let executor = TransactionExecutor::new(h.state.clone());
        let job = approved_row(&h, "page-1", "1000000").await;

        executor.execute(&job).await.unwrap();
        // same job delivered again, e.g. after a worker lost its lease
        executor.execute(&job).await.unwrap();

        assert_eq!(h.chain.submitted.lock().unwrap().len(), 1);
        assert_eq!(
            h.state
                .db
                .get_transactions_by_page("page-1")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn chain_failure_is_retryable() {
        let h = harness().await;
        let executor = TransactionExecutor::new(h.state.clone());
        let job = approved_row(&h, "page-1", "1000000").await;
        *h.chain.fail_submit.lock().unwrap() = true;

        let err = executor.execute(&job).await.unwrap_err();
        assert!(matches!(err, JobError::Retryable(_)));
        // still Processing: the queue owns the retry
        let row = h
            .state
            .db
            .get_scheduled_by_page("page-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.operata_status, OperataStatus::Processing);
    }

    #[tokio::test]
    async fn malformed_job_data_is_fatal() {
        let h = harness().await;
        let executor = TransactionExecutor::new(h.state.clone());

        let bad_amount = approved_row(&h, "page-1", "10.5").await;
        assert!(matches!(
            executor.execute(&bad_amount).await.unwrap_err(),
            JobError::Fatal(_)
        ));

        let mut bad_address = approved_row(&h, "page-2", "10").await;
        bad_address.to_address = "not-a-pubkey".to_string();
        assert!(matches!(
            executor.execute(&bad_address).await.unwrap_err(),
            JobError::Fatal(_)
        ));
        assert!(h.chain.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_page_is_fatal() {
        let h = harness().await;
        let executor = TransactionExecutor::new(h.state.clone());
        let mut job = approved_row(&h, "page-1", "10").await;
        job.page_id = "page-unknown".to_string();

        assert!(matches!(
            executor.execute(&job).await.unwrap_err(),
            JobError::Fatal(_)
        ));
    }

    #[tokio::test]
    async fn exhaustion_marks_the_row_failed_and_mirrors_it() {
        let h = harness().await;
        let executor = TransactionExecutor::new(h.state.clone());
        let job = approved_row(&h, "page-1", "1000000").await;

        executor
            .exhausted(
                &QueueJob::ScheduledTransaction(job),
                &JobError::Retryable(anyhow::anyhow!("rpc unavailable")),
            )
            .await;

        let row = h
            .state
            .db
            .get_scheduled_by_page("page-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.operata_status, OperataStatus::Failed);
        let writes = h.pages.property_writes.lock().unwrap();
        assert!(writes.iter().any(|(page_id, props)| {
            page_id == "page-1"
                && props.contains(&("Operata Status".to_string(), "Failed".to_string()))
        }));
    }
}
