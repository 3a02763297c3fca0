//! In-memory fakes for the chain and document-store collaborators, shared by
//! the pipeline tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{
    ChainClient, Database, InboundTransfer, KeyVault, Page, PageStore, Wallet, Workspace,
};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;

use crate::state::AppState;

pub const TEST_SECRET: &str = "test-master-secret";

#[derive(Default)]
pub struct MockChain {
    pub balances: Mutex<HashMap<String, u64>>,
    pub transfers: Mutex<Vec<InboundTransfer>>,
    pub submitted: Mutex<Vec<(String, u64)>>,
    pub fail_submit: Mutex<bool>,
}

#[async_trait]
impl ChainClient for MockChain {
    async fn balance(&self, address: &str) -> anyhow::Result<u64> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    async fn submit_transfer(
        &self,
        _signer: &Keypair,
        to: &Pubkey,
        lamports: u64,
    ) -> anyhow::Result<String> {
        if *self.fail_submit.lock().unwrap() {
            anyhow::bail!("rpc unavailable");
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push((to.to_string(), lamports));
        Ok(format!("sig-{}", submitted.len()))
    }

    async fn recent_transfers(&self, _address: &str) -> anyhow::Result<Vec<InboundTransfer>> {
        Ok(self.transfers.lock().unwrap().clone())
    }
}

/// Page store backed by a map. Pages are registered by tests; writes are
/// recorded for assertion.
#[derive(Default)]
pub struct MemPages {
    pub pages: Mutex<HashMap<String, Page>>,
    pub property_writes: Mutex<Vec<(String, Vec<(String, String)>)>>,
    pub created: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MemPages {
    pub fn insert(&self, page: Page) {
        self.pages.lock().unwrap().insert(page.id.clone(), page);
    }
}

#[async_trait]
impl PageStore for MemPages {
    async fn retrieve_page(&self, _token: &str, page_id: &str) -> anyhow::Result<Page> {
        self.pages
            .lock()
            .unwrap()
            .get(page_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("page {page_id} not found"))
    }

    async fn update_select_properties(
        &self,
        _token: &str,
        page_id: &str,
        properties: &[(&str, &str)],
    ) -> anyhow::Result<()> {
        self.property_writes.lock().unwrap().push((
            page_id.to_string(),
            properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        Ok(())
    }

    async fn create_page(
        &self,
        _token: &str,
        database_id: &str,
        properties: serde_json::Value,
    ) -> anyhow::Result<Page> {
        let mut created = self.created.lock().unwrap();
        created.push((database_id.to_string(), properties));
        Ok(Page {
            id: format!("created-{}", created.len()),
            parent: None,
            properties: HashMap::new(),
        })
    }

    async fn query_recent_pages(
        &self,
        _token: &str,
        database_id: &str,
        _page_size: u32,
    ) -> anyhow::Result<Vec<Page>> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.parent_database_id() == Some(database_id))
            .cloned()
            .collect())
    }
}

pub struct TestHarness {
    pub state: Arc<AppState>,
    pub chain: Arc<MockChain>,
    pub pages: Arc<MemPages>,
    pub workspace: Workspace,
    pub wallet: Wallet,
}

/// Fresh in-memory pipeline with one workspace and one wallet whose schedule
/// container is `db-sched` and received container `db-received`.
pub async fn harness() -> TestHarness {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let chain = Arc::new(MockChain::default());
    let pages = Arc::new(MemPages::default());
    let vault = KeyVault::new(TEST_SECRET.to_string());

    let workspace = Workspace::new("token-1", "notion-ws-1");
    db.save_workspace(&workspace).await.unwrap();

    let generated = vault.generate_wallet().unwrap();
    let wallet = Wallet::new(
        &workspace.id,
        &generated.address,
        "solana",
        Some("db-sched".to_string()),
        Some("db-transactions".to_string()),
        None,
        Some("db-received".to_string()),
    );
    db.save_wallet(&wallet).await.unwrap();
    db.save_key_pair(&common::KeyPair {
        wallet_id: wallet.id.clone(),
        public_key: generated.public_key,
        private_key: generated.encrypted_private_key,
        created_at: None,
    })
    .await
    .unwrap();

    let state = Arc::new(AppState {
        db,
        vault,
        chain: chain.clone(),
        pages: pages.clone(),
    });
    TestHarness {
        state,
        chain,
        pages,
        workspace,
        wallet,
    }
}

/// Builds a schedule page in the wallet's schedule container.
pub fn schedule_page(
    page_id: &str,
    admin_status: &str,
    schedule_date: &str,
) -> Page {
    serde_json::from_value(serde_json::json!({
        "id": page_id,
        "parent": { "type": "database_id", "database_id": "db-sched" },
        "properties": {
            "Transaction Name": { "type": "title", "title": [{ "plain_text": "Rent" }] },
            "To Address": {
                "type": "rich_text",
                "rich_text": [{ "plain_text": "9ZNTfG4NyQgxy2SWjSiQoUyBPEvXT2xo7fKc5hPYYJ7z" }]
            },
            "Amount": { "type": "number", "number": 1000000.0 },
            "Schedule Date": { "type": "date", "date": { "start": schedule_date } },
            "Admin Status": { "type": "select", "select": { "name": admin_status } },
            "Operata Status": { "type": "select", "select": null }
        }
    }))
    .unwrap()
}
