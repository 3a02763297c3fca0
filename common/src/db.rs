use std::str::FromStr;

use anyhow::Context;
use chrono::NaiveDateTime;
use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};

use crate::schema::{
    AdminStatus, KeyPair, OperataStatus, QueueJobRow, ReceivedTransaction, ScheduledTransaction,
    Transaction, Wallet, Workspace,
};

/// Facade over the relational store. The store is the single authoritative
/// copy of pipeline state; page writes are a best-effort mirror of it.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Failed to create SQLite connect options")?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        sqlx::migrate!()
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(Self { pool })
    }

    // --- workspaces ---

    pub async fn save_workspace(&self, workspace: &Workspace) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workspaces (id, notion_token, notion_workspace_id)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&workspace.id)
        .bind(&workspace.notion_token)
        .bind(&workspace.notion_workspace_id)
        .execute(&self.pool)
        .await
        .context("Failed to save workspace to database")?;
        Ok(())
    }

    pub async fn get_workspace(&self, workspace_id: &str) -> anyhow::Result<Option<Workspace>> {
        let row = sqlx::query_as::<_, Workspace>(
            r#"
            SELECT * FROM workspaces WHERE id = ?
            "#,
        )
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get workspace with id {workspace_id}"))?;
        Ok(row)
    }

    // --- wallets & key pairs ---

    pub async fn save_wallet(&self, wallet: &Wallet) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (
                id, workspace_id, address, chain_type, balance,
                schedule_db_id, transactions_db_id, nfts_db_id, received_db_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&wallet.id)
        .bind(&wallet.workspace_id)
        .bind(&wallet.address)
        .bind(&wallet.chain_type)
        .bind(wallet.balance)
        .bind(&wallet.schedule_db_id)
        .bind(&wallet.transactions_db_id)
        .bind(&wallet.nfts_db_id)
        .bind(&wallet.received_db_id)
        .execute(&self.pool)
        .await
        .context("Failed to save wallet to database")?;
        Ok(())
    }

    pub async fn get_wallet(&self, wallet_id: &str) -> anyhow::Result<Option<Wallet>> {
        let row = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT * FROM wallets WHERE id = ?
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get wallet with id {wallet_id}"))?;
        Ok(row)
    }

    pub async fn get_wallets(&self) -> anyhow::Result<Vec<Wallet>> {
        let rows = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT * FROM wallets
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to get all wallets from database")?;
        Ok(rows)
    }

    /// Finds the wallet owning a per-purpose container (any of the four
    /// lanes). Lane selection itself happens on the returned row.
    pub async fn get_wallet_by_container(&self, database_id: &str) -> anyhow::Result<Option<Wallet>> {
        let row = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT * FROM wallets
            WHERE schedule_db_id = ?1 OR transactions_db_id = ?1
               OR nfts_db_id = ?1 OR received_db_id = ?1
            "#,
        )
        .bind(database_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to look up wallet for container {database_id}"))?;
        Ok(row)
    }

    pub async fn update_wallet_balance(
        &self,
        wallet_id: &str,
        balance: i64,
        synced_at: NaiveDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET balance = ?, last_sync_at = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(balance)
        .bind(synced_at)
        .bind(wallet_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update balance for wallet {wallet_id}"))?;
        Ok(())
    }

    pub async fn save_key_pair(&self, key_pair: &KeyPair) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO key_pairs (wallet_id, public_key, private_key)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&key_pair.wallet_id)
        .bind(&key_pair.public_key)
        .bind(&key_pair.private_key)
        .execute(&self.pool)
        .await
        .context("Failed to save key pair to database")?;
        Ok(())
    }

    pub async fn get_key_pair(&self, wallet_id: &str) -> anyhow::Result<Option<KeyPair>> {
        let row = sqlx::query_as::<_, KeyPair>(
            r#"
            SELECT * FROM key_pairs WHERE wallet_id = ?
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get key pair for wallet {wallet_id}"))?;
        Ok(row)
    }

    // --- scheduled transactions ---

    pub async fn get_scheduled_by_page(
        &self,
        notion_page_id: &str,
    ) -> anyhow::Result<Option<ScheduledTransaction>> {
        let row = sqlx::query_as::<_, ScheduledTransaction>(
            r#"
            SELECT * FROM scheduled_transactions WHERE notion_page_id = ?
            "#,
        )
        .bind(notion_page_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get scheduled transaction for page {notion_page_id}"))?;
        Ok(row)
    }

    /// Upsert keyed by `notion_page_id`. Replaying the same event converges
    /// on one row.
    pub async fn upsert_scheduled(
        &self,
        notion_page_id: &str,
        wallet_id: &str,
        transaction_name: &str,
        to_address: &str,
        amount: &str,
        schedule_date: NaiveDateTime,
        admin_status: AdminStatus,
        operata_status: OperataStatus,
    ) -> anyhow::Result<ScheduledTransaction> {
        let row = sqlx::query_as::<_, ScheduledTransaction>(
            r#"
            INSERT INTO scheduled_transactions (
                notion_page_id, wallet_id, transaction_name, to_address,
                amount, schedule_date, admin_status, operata_status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (notion_page_id) DO UPDATE SET
                transaction_name = excluded.transaction_name,
                to_address = excluded.to_address,
                amount = excluded.amount,
                schedule_date = excluded.schedule_date,
                admin_status = excluded.admin_status,
                operata_status = excluded.operata_status,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *
            "#,
        )
        .bind(notion_page_id)
        .bind(wallet_id)
        .bind(transaction_name)
        .bind(to_address)
        .bind(amount)
        .bind(schedule_date)
        .bind(admin_status)
        .bind(operata_status)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert scheduled transaction for page {notion_page_id}"))?;
        Ok(row)
    }

    pub async fn update_scheduled_statuses(
        &self,
        id: i64,
        admin_status: Option<AdminStatus>,
        operata_status: Option<OperataStatus>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_transactions
            SET admin_status = COALESCE(?, admin_status),
                operata_status = COALESCE(?, operata_status),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(admin_status)
        .bind(operata_status)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update statuses for scheduled transaction {id}"))?;
        Ok(())
    }

    pub async fn set_operata_status_by_page(
        &self,
        notion_page_id: &str,
        status: OperataStatus,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_transactions
            SET operata_status = ?, updated_at = CURRENT_TIMESTAMP
            WHERE notion_page_id = ?
            "#,
        )
        .bind(status)
        .bind(notion_page_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to set operata status for page {notion_page_id}"))?;
        Ok(())
    }

    // --- transactions (ledger) ---

    pub async fn save_transaction(&self, transaction: &Transaction) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                hash, from_address, to_address, value, status, wallet_id, notion_page_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&transaction.hash)
        .bind(&transaction.from_address)
        .bind(&transaction.to_address)
        .bind(&transaction.value)
        .bind(transaction.status)
        .bind(&transaction.wallet_id)
        .bind(&transaction.notion_page_id)
        .execute(&self.pool)
        .await
        .context("Failed to save transaction")?;
        Ok(())
    }

    pub async fn get_transactions_by_page(
        &self,
        notion_page_id: &str,
    ) -> anyhow::Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions WHERE notion_page_id = ?
            "#,
        )
        .bind(notion_page_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to get transactions for page {notion_page_id}"))?;
        Ok(rows)
    }

    // --- received transactions ---

    pub async fn received_transaction_exists(
        &self,
        wallet_id: &str,
        transaction_hash: &str,
    ) -> anyhow::Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM received_transactions
            WHERE wallet_id = ? AND transaction_hash = ?
            "#,
        )
        .bind(wallet_id)
        .bind(transaction_hash)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to check for existing received transaction")?;
        Ok(row.is_some())
    }

    pub async fn save_received_transaction(
        &self,
        received: &ReceivedTransaction,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO received_transactions (
                wallet_id, from_address, amount, token_name,
                transaction_hash, date, status, notion_page_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&received.wallet_id)
        .bind(&received.from_address)
        .bind(&received.amount)
        .bind(&received.token_name)
        .bind(&received.transaction_hash)
        .bind(received.date)
        .bind(&received.status)
        .bind(&received.notion_page_id)
        .execute(&self.pool)
        .await
        .context("Failed to save received transaction")?;
        Ok(())
    }

    // --- queue jobs ---

    pub async fn enqueue_job(
        &self,
        queue: &str,
        payload: &str,
        run_at: NaiveDateTime,
        max_attempts: i64,
        backoff_base_ms: i64,
    ) -> anyhow::Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO queue_jobs (queue, payload, run_at, max_attempts, backoff_base_ms)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(queue)
        .bind(payload)
        .bind(run_at)
        .bind(max_attempts)
        .bind(backoff_base_ms)
        .fetch_one(&self.pool)
        .await
        .context("Failed to enqueue job")?;
        Ok(row.0)
    }

    /// Atomically claims the next due waiting job and leases it to `worker`.
    pub async fn claim_due_job(
        &self,
        queue: &str,
        worker: &str,
        now: NaiveDateTime,
        lease_until: NaiveDateTime,
    ) -> anyhow::Result<Option<QueueJobRow>> {
        let row = sqlx::query_as::<_, QueueJobRow>(
            r#"
            UPDATE queue_jobs
            SET state = 'active', locked_by = ?, locked_until = ?
            WHERE id = (
                SELECT id FROM queue_jobs
                WHERE queue = ? AND state = 'waiting' AND run_at <= ?
                ORDER BY run_at
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker)
        .bind(lease_until)
        .bind(queue)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim due job")?;
        Ok(row)
    }

    pub async fn renew_job_lease(&self, job_id: i64, lease_until: NaiveDateTime) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE queue_jobs SET locked_until = ? WHERE id = ? AND state = 'active'
            "#,
        )
        .bind(lease_until)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to renew lease for job {job_id}"))?;
        Ok(())
    }

    /// Returns stalled active jobs (lapsed lease) to the waiting state so
    /// another worker redelivers them.
    pub async fn release_stalled_jobs(&self, now: NaiveDateTime) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET state = 'waiting', locked_by = NULL, locked_until = NULL
            WHERE state = 'active' AND locked_until < ?
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to release stalled jobs")?;
        Ok(result.rows_affected())
    }

    pub async fn delete_job(&self, job_id: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            DELETE FROM queue_jobs WHERE id = ?
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to delete job {job_id}"))?;
        Ok(())
    }

    pub async fn reschedule_job(
        &self,
        job_id: i64,
        run_at: NaiveDateTime,
        attempts: i64,
        last_error: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET state = 'waiting', locked_by = NULL, locked_until = NULL,
                run_at = ?, attempts = ?, last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(run_at)
        .bind(attempts)
        .bind(last_error)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to reschedule job {job_id}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    async fn seed_wallet(db: &Database) -> Wallet {
        let workspace = Workspace::new("secret-token", "ws-1");
        db.save_workspace(&workspace).await.unwrap();
        let wallet = Wallet {
            id: "wallet-1".into(),
            workspace_id: workspace.id.clone(),
            address: "11111111111111111111111111111111".into(),
            chain_type: "solana".into(),
            balance: 0,
            last_sync_at: None,
            schedule_db_id: Some("db-sched".into()),
            transactions_db_id: Some("db-tx".into()),
            nfts_db_id: None,
            received_db_id: Some("db-recv".into()),
            created_at: None,
            updated_at: None,
        };
        db.save_wallet(&wallet).await.unwrap();
        wallet
    }

    #[tokio::test]
    async fn upsert_scheduled_is_idempotent() {
        let db = test_db().await;
        let wallet = seed_wallet(&db).await;
        let when = Utc::now().naive_utc();

        for _ in 0..2 {
            db.upsert_scheduled(
                "page-1",
                &wallet.id,
                "Rent",
                "0xABC",
                "10",
                when,
                AdminStatus::Scheduled,
                OperataStatus::Pending,
            )
            .await
            .unwrap();
        }

        let row = db.get_scheduled_by_page("page-1").await.unwrap().unwrap();
        assert_eq!(row.amount, "10");
        // the conflict path updated in place, so a fresh id was not handed out
        let replay = db
            .upsert_scheduled(
                "page-1",
                &wallet.id,
                "Rent",
                "0xABC",
                "12",
                when,
                AdminStatus::Scheduled,
                OperataStatus::Pending,
            )
            .await
            .unwrap();
        assert_eq!(replay.id, row.id);
        assert_eq!(replay.amount, "12");
    }

    #[tokio::test]
    async fn wallet_container_lookup_selects_lane() {
        let db = test_db().await;
        let wallet = seed_wallet(&db).await;

        let found = db.get_wallet_by_container("db-sched").await.unwrap().unwrap();
        assert_eq!(found.id, wallet.id);
        assert_eq!(
            found.lane_for_container("db-sched"),
            Some(crate::schema::ContainerLane::ScheduledTransaction)
        );
        assert_eq!(
            found.lane_for_container("db-recv"),
            Some(crate::schema::ContainerLane::ReceivedTransaction)
        );
        assert!(db.get_wallet_by_container("db-other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claimed_job_is_invisible_until_stalled() {
        let db = test_db().await;
        let now = Utc::now().naive_utc();

        db.enqueue_job("q", "{}", now, 6, 10_000).await.unwrap();

        let lease = now + chrono::Duration::seconds(30);
        let job = db.claim_due_job("q", "w1", now, lease).await.unwrap().unwrap();
        assert_eq!(job.state, "active");

        // same job cannot be claimed twice while the lease holds
        assert!(db.claim_due_job("q", "w2", now, lease).await.unwrap().is_none());

        // after the lease lapses the reaper hands it back
        let later = now + chrono::Duration::seconds(60);
        assert_eq!(db.release_stalled_jobs(later).await.unwrap(), 1);
        let redelivered = db.claim_due_job("q", "w2", later, later).await.unwrap();
        assert_eq!(redelivered.unwrap().id, job.id);
    }

    #[tokio::test]
    async fn future_job_is_not_due() {
        let db = test_db().await;
        let now = Utc::now().naive_utc();
        let run_at = now + chrono::Duration::seconds(5);

        db.enqueue_job("q", "{}", run_at, 6, 10_000).await.unwrap();
        assert!(db.claim_due_job("q", "w1", now, now).await.unwrap().is_none());
        assert!(
            db.claim_due_job("q", "w1", run_at, run_at)
                .await
                .unwrap()
                .is_some()
        );
    }
}
