mod chain;
mod custody;
mod db;
mod pages;
mod schema;

pub use chain::*;
pub use custody::*;
pub use db::*;
pub use pages::*;
pub use schema::*;
