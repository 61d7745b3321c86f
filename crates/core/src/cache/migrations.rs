//! Database schema migrations.
//!
//! Each cache table carries its own version history in `_cache_migrations`,
//! keyed by table name, so namespaces sharing a file migrate independently.
//! Every step checks the live schema before changing it, which keeps a rerun
//! harmless even when the ledger is missing (e.g. tables created by older
//! writers that never recorded versions).

use super::Error;
use tokio_rusqlite::rusqlite::{self, Connection as RawConnection};
use tokio_rusqlite::{Connection, params};

/// A single schema step for a cache table.
struct Migration {
    version: i64,
    description: &'static str,
    apply: fn(&RawConnection, &str) -> rusqlite::Result<()>,
}

/// Migration list, applied in order.
const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, description: "create cache table", apply: create_table },
    Migration { version: 2, description: "add expires_at column", apply: add_expires_at },
];

fn create_table(conn: &RawConnection, table: &str) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            key TEXT PRIMARY KEY,
            value BLOB,
            created_time DATETIME,
            expires_at DATETIME
        )"
    ))
}

/// Tables created before expiry support have only three columns.
/// Existing rows get `expires_at = NULL` and never expire.
fn add_expires_at(conn: &RawConnection, table: &str) -> rusqlite::Result<()> {
    if has_column(conn, table, "expires_at")? {
        return Ok(());
    }
    conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN expires_at DATETIME"))
}

/// Check whether `table` currently has a column named `column`.
fn has_column(conn: &RawConnection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Run any pending migrations for `table`.
///
/// Creates the `_cache_migrations` ledger if needed, reads the table's current
/// version, and applies each newer step in its own transaction.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` if the ledger or any step fails.
pub async fn run(conn: &Connection, table: &str) -> Result<(), Error> {
    let table = table.to_string();
    conn.call(move |conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _cache_migrations (
                table_name TEXT NOT NULL,
                version INTEGER NOT NULL,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL,
                PRIMARY KEY (table_name, version)
            )",
            [],
        )?;

        let current: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _cache_migrations WHERE table_name = ?1",
            params![table],
            |row| row.get(0),
        )?;

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            let tx = conn.transaction()?;
            (migration.apply)(&tx, &table)?;
            tx.execute(
                "INSERT OR IGNORE INTO _cache_migrations (table_name, version, description, applied_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![table, migration.version, migration.description, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(table = %table, version = migration.version, "{}", migration.description);
        }

        Ok(())
    })
    .await
    .map_err(|e| match Error::from(e) {
        err @ Error::MigrationFailed(_) => err,
        err => Error::MigrationFailed(err.to_string()),
    })
}
