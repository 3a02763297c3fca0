use std::sync::Arc;

use anyhow::Context;
use common::{
    ChainClient, Database, KeyVault, NotionApi, OperataStatus, PageStore, SolanaChain, Wallet,
    Workspace,
};

use crate::config::AppConfig;

/// Explicitly constructed services shared across the pipeline. Held behind
/// `Arc` and passed by reference; there are no process-wide singletons.
pub struct AppState {
    pub db: Database,
    pub vault: KeyVault,
    pub chain: Arc<dyn ChainClient>,
    pub pages: Arc<dyn PageStore>,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let db = Database::new(&config.database_url).await?;
        log::info!("Database initialized successfully!");

        Ok(AppState {
            db,
            vault: KeyVault::new(config.encryption_key.clone()),
            chain: Arc::new(SolanaChain::new(&config.rpc_url)),
            pages: Arc::new(NotionApi::new(&config.notion_api_url)),
        })
    }

    pub async fn workspace_for_wallet(&self, wallet: &Wallet) -> anyhow::Result<Workspace> {
        self.db
            .get_workspace(&wallet.workspace_id)
            .await?
            .with_context(|| format!("Workspace {} not found", wallet.workspace_id))
    }

    /// Best-effort mirror of the pipeline status onto the page. The store is
    /// authoritative; a failed page write is logged, never rolled back.
    pub async fn mirror_operata_status(
        &self,
        token: &str,
        notion_page_id: &str,
        status: OperataStatus,
    ) {
        if let Err(e) = self
            .pages
            .update_select_properties(token, notion_page_id, &[("Operata Status", status.as_str())])
            .await
        {
            log::error!(
                "Failed to mirror status {} to page {notion_page_id}: {e:#}",
                status.as_str()
            );
        }
    }
}
