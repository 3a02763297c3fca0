use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A connected document-store workspace. The token authorizes every page
/// read/write done on behalf of the wallets it owns.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workspace {
    pub id: String,
    pub notion_token: String,
    pub notion_workspace_id: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl Workspace {
    pub fn new(notion_token: &str, notion_workspace_id: &str) -> Self {
        Workspace {
            id: uuid::Uuid::new_v4().to_string(),
            notion_token: notion_token.to_string(),
            notion_workspace_id: notion_workspace_id.to_string(),
            created_at: None,
            updated_at: None,
        }
    }
}
