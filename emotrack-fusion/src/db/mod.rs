//! Database access for emotrack-fusion
//!
//! Finalized session results are kept in a local SQLite file.

pub mod results;

use emotrack_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database
///
/// Every SQLite memory connection is its own database, so the pool is
/// capped at one connection.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create the session_results table if it does not exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_results (
            session_id TEXT PRIMARY KEY,
            name TEXT,
            session_key TEXT,
            frame_count INTEGER NOT NULL,
            probability_frames INTEGER NOT NULL,
            action_unit_frames INTEGER NOT NULL,
            probability_label TEXT NOT NULL,
            probability_confidence REAL NOT NULL,
            probability_aggregate TEXT NOT NULL,
            action_unit_label TEXT NOT NULL,
            action_unit_confidence REAL NOT NULL,
            action_unit_aggregate TEXT NOT NULL,
            action_units_available INTEGER NOT NULL,
            sources_agree INTEGER NOT NULL,
            started_at TEXT NOT NULL,
            finalized_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (session_results)");

    Ok(())
}
