pub mod backend;
pub mod connection;
pub mod migration_runner;

pub use backend::{NewAccount, SqliteBackend};
pub use connection::Database;
