use crate::monitoring::types::UnsupportedInterval;

/// Store-level error taxonomy shared by the target registry and the uptime
/// log. Probe failures are not errors; they are recorded as `up = false`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("owner {owner:?} is at the limit of {limit} monitored urls")]
    CapacityExceeded { owner: String, limit: usize },

    #[error(transparent)]
    Interval(#[from] UnsupportedInterval),

    /// Registry write or log append failed at the database layer. Surfaced
    /// to the caller or tick loop; never fatal to a scheduler job.
    #[error("persistence failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl From<libsql::Error> for StoreError {
    fn from(e: libsql::Error) -> Self {
        StoreError::Persistence(e.into())
    }
}

impl From<deadpool::managed::PoolError<libsql::Error>> for StoreError {
    fn from(e: deadpool::managed::PoolError<libsql::Error>) -> Self {
        StoreError::Persistence(anyhow::Error::new(e))
    }
}
