//! SQLite persistence for the description generator.
//!
//! [`Database`] implements every store trait from `catalog-core`:
//! catalog items with their generation state, settings, the audit log,
//! the bulk queue's job table and the single-slot monitor state.
//!
//! # Example
//!
//! ```no_run
//! use catalog_core::{QueueStore, Tier};
//! use database::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:describer.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     db.upsert_pending(42, Tier::Mid).await?;
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod catalog;
pub mod error;
pub mod models;
pub mod monitor;
pub mod queue_job;
pub mod setting;

pub use error::{DatabaseError, Result};
pub use models::CatalogEntry;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Sized for concurrent queue jobs plus the health monitor.
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect to a SQLite database, creating the file when missing.
    ///
    /// The worker and one-shot CLI commands share the file, so connections
    /// use WAL and wait for locks instead of failing.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// In-memory databases need a pool size of 1: every connection opens
    /// its own private database.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(url, pool_size, "database connected");
        Ok(Self { pool })
    }

    /// Apply pending migrations. Safe to call on every start.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::debug!("migrations applied");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) async fn test_db() -> Database {
    let db = Database::connect_with_pool_size("sqlite::memory:", 1)
        .await
        .unwrap();
    db.migrate().await.unwrap();
    db
}
