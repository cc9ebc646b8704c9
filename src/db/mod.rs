//! SQLite-backed persistence for the ledger and valuation history.

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::Repository;
