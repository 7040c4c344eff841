pub mod app_config;
pub mod database;
pub mod memory;
mod offer_repo;
pub mod pg_store;
mod purchase_repo;

pub use app_config::{Config, StoreKind};
pub use database::DbClient;
pub use memory::MemoryStore;
pub use pg_store::PgMarketStore;
