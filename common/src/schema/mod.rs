mod queue_job;
mod received_transaction;
mod scheduled_transaction;
mod transaction;
mod wallet;
mod workspace;

pub use queue_job::*;
pub use received_transaction::*;
pub use scheduled_transaction::*;
pub use transaction::*;
pub use wallet::*;
pub use workspace::*;
