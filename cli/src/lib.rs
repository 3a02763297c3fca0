mod args;

pub use args::{Args, Commands, CreateWalletArgs, CreateWorkspaceArgs};
use clap::Parser;
use common::{Database, KeyPair, KeyVault, Wallet, Workspace};

/// Runs the CLI command parser and executes the selected command.
/// Returns true if a CLI command was handled, false otherwise.
pub async fn run_cli() -> bool {
    let args = Args::parse();
    match &args.command {
        Some(Commands::CreateWorkspace(workspace_args)) => {
            match create_workspace(&workspace_args.token, &workspace_args.workspace_id).await {
                Ok(id) => println!("Workspace created with id: {id}"),
                Err(e) => eprintln!("Failed to create workspace: {e:#}"),
            }
            true
        }
        Some(Commands::CreateWallet(wallet_args)) => {
            match create_wallet(wallet_args).await {
                Ok((id, address)) => {
                    println!("Wallet created!\n Id: {id} Address: {address}")
                }
                Err(e) => eprintln!("Failed to create wallet: {e:#}"),
            }
            true
        }
        None => false,
    }
}

async fn connect_db() -> anyhow::Result<Database> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;
    Database::new(&database_url).await
}

async fn create_workspace(token: &str, notion_workspace_id: &str) -> anyhow::Result<String> {
    let db = connect_db().await?;
    let workspace = Workspace::new(token, notion_workspace_id);
    db.save_workspace(&workspace).await?;
    Ok(workspace.id)
}

/// Generates the signing keypair through the vault and persists the wallet
/// with its encrypted key material. The plaintext key is never printed.
async fn create_wallet(args: &CreateWalletArgs) -> anyhow::Result<(String, String)> {
    let encryption_key = std::env::var("ENCRYPTION_KEY")
        .map_err(|_| anyhow::anyhow!("ENCRYPTION_KEY not set"))?;
    let db = connect_db().await?;

    if db.get_workspace(&args.workspace).await?.is_none() {
        return Err(anyhow::anyhow!(
            "No workspace found with id '{}'",
            args.workspace
        ));
    }

    let vault = KeyVault::new(encryption_key);
    let generated = vault
        .generate_wallet()
        .map_err(|e| anyhow::anyhow!("Key generation failed: {e}"))?;

    let wallet = Wallet::new(
        &args.workspace,
        &generated.address,
        &args.chain_type,
        Some(args.schedule_db.clone()),
        args.transactions_db.clone(),
        args.nfts_db.clone(),
        args.received_db.clone(),
    );
    db.save_wallet(&wallet).await?;
    db.save_key_pair(&KeyPair {
        wallet_id: wallet.id.clone(),
        public_key: generated.public_key,
        private_key: generated.encrypted_private_key,
        created_at: None,
    })
    .await?;

    Ok((wallet.id, generated.address))
}
