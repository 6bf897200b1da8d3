use deadpool::managed::{self, Pool, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError};

/// Deadpool manager handing out connections to the local libsql database.
/// Timer tasks and the CLI share one pool; libsql serializes the writes.
pub struct ConnectionManager {
    database: Database,
}

impl ConnectionManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for ConnectionManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        self.database.connect()
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        conn.query("SELECT 1", ())
            .await?
            .next()
            .await?
            .ok_or(LibsqlError::QueryReturnedNoRows)?;
        Ok(())
    }
}

pub type DbPool = Pool<ConnectionManager>;

pub fn build_pool(database: Database, max_size: usize) -> anyhow::Result<DbPool> {
    Pool::builder(ConnectionManager::new(database))
        .max_size(max_size)
        .build()
        .map_err(Into::into)
}
