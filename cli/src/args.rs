use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Operata CLI - provision workspaces and custodial wallets")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a document-store workspace
    ///
    /// Stores the integration token used for every page read/write done on
    /// behalf of the workspace's wallets.
    CreateWorkspace(CreateWorkspaceArgs),

    /// Create a custodial wallet inside a workspace
    ///
    /// Generates a signing keypair, seals it in the vault and records the
    /// wallet with its per-purpose container ids.
    CreateWallet(CreateWalletArgs),
}

#[derive(ClapArgs, Debug)]
pub struct CreateWorkspaceArgs {
    /// Document-store integration token
    #[arg(short, long, help = "Document-store integration token")]
    pub token: String,

    /// Workspace id as known to the document store
    #[arg(short, long, help = "Workspace id as known to the document store")]
    pub workspace_id: String,
}

#[derive(ClapArgs, Debug)]
pub struct CreateWalletArgs {
    /// Id of the owning workspace
    #[arg(short, long, help = "Id of the owning workspace")]
    pub workspace: String,

    /// Container id of the scheduled-transactions database
    #[arg(long, help = "Container id of the scheduled-transactions database")]
    pub schedule_db: String,

    /// Container id of the transactions database
    #[arg(long, help = "Container id of the transactions database")]
    pub transactions_db: Option<String>,

    /// Container id of the NFTs database
    #[arg(long, help = "Container id of the NFTs database")]
    pub nfts_db: Option<String>,

    /// Container id of the received-transactions database
    #[arg(long, help = "Container id of the received-transactions database")]
    pub received_db: Option<String>,

    /// Chain the wallet lives on
    #[arg(long, default_value = "solana", help = "Chain the wallet lives on")]
    pub chain_type: String,
}
