//! Session store implementations for Sentient.

pub mod in_memory;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod rows;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(test)]
mod contract;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use sentient_core::error::MemoryError;
use sentient_core::memory::MemoryStore;
use std::sync::Arc;

/// Open the store a connection string points at.
///
/// `memory://` gives a throwaway [`InMemoryStore`]; `sqlite:` and
/// `postgres://` need the matching feature.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<Arc<dyn MemoryStore>, MemoryError> {
    let scheme = database_url.split(':').next().unwrap_or_default();
    match scheme {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteStore::connect(database_url).await?)),
        #[cfg(feature = "postgres")]
        "postgres" | "postgresql" => Ok(Arc::new(
            PostgresStore::connect(database_url, max_connections).await?,
        )),
        other => {
            let _ = max_connections;
            Err(MemoryError::Unavailable(format!(
                "no store backend compiled in for '{other}:' URLs"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_url_opens_in_memory_store() {
        let store = connect("memory://", 1).await.unwrap();
        assert_eq!(store.name(), "in_memory");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_url_opens_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("s.db").display());
        let store = connect(&url, 1).await.unwrap();
        assert_eq!(store.name(), "sqlite");
    }

    #[tokio::test]
    async fn unknown_scheme_is_rejected() {
        assert!(connect("mysql://localhost/db", 1).await.is_err());
    }
}
