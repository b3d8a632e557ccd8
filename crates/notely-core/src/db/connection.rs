//! Database connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations::{self, Migration, LOCAL_MIGRATIONS};

/// Database wrapper for libSQL connections
pub struct Database {
    // Keeps the underlying database handle alive for `conn`.
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open the on-device note store at the given path, creating it if it
    /// doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_migrations(path, LOCAL_MIGRATIONS).await
    }

    /// Open an in-memory note store (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_migrations(LOCAL_MIGRATIONS).await
    }

    /// Open a database file with an explicit migration set
    pub async fn open_with_migrations(
        path: impl AsRef<Path>,
        migrations: &[Migration],
    ) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        Self::build(&path_str, migrations).await
    }

    /// Open an in-memory database with an explicit migration set
    pub async fn open_in_memory_with_migrations(migrations: &[Migration]) -> Result<Self> {
        Self::build(":memory:", migrations).await
    }

    async fn build(path: &str, migrations: &[Migration]) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        let database = Self { _db: db, conn };
        database.configure().await?;
        migrations::run(&database.conn, migrations).await?;
        Ok(database)
    }

    /// Configure `SQLite` for optimal performance
    async fn configure(&self) -> Result<()> {
        // WAL is unavailable for in-memory databases
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        self.conn
            .execute("PRAGMA busy_timeout = 5000;", ())
            .await
            .ok();
        Ok(())
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        let mut rows = db.connection().query("SELECT 1", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i32>(0).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_file_creates_schema() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("notely.db");

        let db = Database::open(&db_path).await.unwrap();
        drop(db);
        assert!(db_path.exists());

        // Reopening runs migrations again without failing
        Database::open(&db_path).await.unwrap();
    }
}
