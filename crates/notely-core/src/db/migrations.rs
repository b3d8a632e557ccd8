//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// A single schema version, applied in one transaction
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

/// Schema of the on-device note store
pub const LOCAL_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "local note store with sync status index",
    statements: &[
        "CREATE TABLE IF NOT EXISTS local_notes (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            last_modified INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            sync_status TEXT NOT NULL DEFAULT 'pending'
        )",
        "CREATE INDEX IF NOT EXISTS idx_local_notes_sync_status ON local_notes(sync_status)",
        "CREATE INDEX IF NOT EXISTS idx_local_notes_last_modified ON local_notes(last_modified DESC)",
    ],
}];

/// Run all pending migrations from `migrations`, in version order
pub async fn run(conn: &Connection, migrations: &[Migration]) -> Result<()> {
    ensure_version_table(conn).await?;
    let version = get_version(conn).await?;

    let mut pending = migrations
        .iter()
        .filter(|migration| migration.version > version)
        .collect::<Vec<_>>();
    pending.sort_by_key(|migration| migration.version);

    for migration in pending {
        apply(conn, migration).await?;
    }

    Ok(())
}

async fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        (),
    )
    .await?;
    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

async fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in migration.statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            [i64::from(migration.version)],
        )
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!(
        "Migrated database to version {} ({})",
        migration.version,
        migration.description
    );
    Ok(())
}
