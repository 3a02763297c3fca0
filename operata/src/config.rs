use anyhow::Context;

pub struct AppConfig {
    pub database_url: String,
    pub rpc_url: String,
    pub encryption_key: String,
    pub notion_api_url: String,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let rpc_url = std::env::var("RPC_URL").context("RPC_URL must be set")?;

        let encryption_key =
            std::env::var("ENCRYPTION_KEY").context("ENCRYPTION_KEY must be set")?;

        let notion_api_url = std::env::var("NOTION_API_URL")
            .unwrap_or_else(|_| "https://api.notion.com".to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("PORT must be a number")?;

        Ok(Self {
            database_url,
            rpc_url,
            encryption_key,
            notion_api_url,
            host,
            port,
        })
    }
}
