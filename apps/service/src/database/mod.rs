/// Database abstraction layer
///
/// Target registry and uptime log behind narrow traits, backed by a local
/// libsql database.
pub mod migrations;
pub mod repository;

pub use repository::{LibsqlStore, StoreOptions, TargetRegistry, UptimeLog};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
