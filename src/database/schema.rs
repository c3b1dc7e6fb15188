/*!
 * Database schema definitions and migrations.
 *
 * This module contains the SQL schema for the version store and handles
 * schema migrations for version upgrades.
 */

use anyhow::{Context, Result};
use rusqlite::Connection;
use log::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // Connection-level settings are not persisted, apply them every time
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Initializing database schema v{}", SCHEMA_VERSION);
        create_all_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating database schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        debug!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .context("Failed to check schema_version table existence")?;

    if !table_exists {
        return Ok(0);
    }

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version in the database
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version, updated_at) VALUES (1, ?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

/// Create all database tables
fn create_all_tables(conn: &Connection) -> Result<()> {
    // WAL lets readers proceed while a writer holds the reserved lock
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS video (
            video_id TEXT PRIMARY KEY,
            primary_audio_language_code TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )?;

    // Writelock columns are nullable as a group; a NULL session key means free
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS subtitle_language (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL REFERENCES video(video_id) ON DELETE CASCADE,
            language_code TEXT NOT NULL,
            is_forked INTEGER NOT NULL DEFAULT 0,
            subtitles_complete INTEGER NOT NULL DEFAULT 0,
            severed_sources TEXT NOT NULL DEFAULT '[]',
            writelock_owner TEXT,
            writelock_session_key TEXT,
            writelock_time TEXT,
            tip_generation INTEGER NOT NULL DEFAULT 0,
            created TEXT NOT NULL,
            UNIQUE(video_id, language_code)
        );

        CREATE INDEX IF NOT EXISTS idx_language_video ON subtitle_language(video_id);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS subtitle_version (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL,
            language_code TEXT NOT NULL,
            version_number INTEGER NOT NULL CHECK (version_number >= 1),
            author TEXT NOT NULL,
            created TEXT NOT NULL,
            visibility TEXT NOT NULL,
            visibility_override TEXT,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            lineage TEXT NOT NULL DEFAULT '{}',
            rollback_of INTEGER,
            title TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            subtitle_count INTEGER NOT NULL,
            UNIQUE(video_id, language_code, version_number),
            FOREIGN KEY (video_id, language_code)
                REFERENCES subtitle_language(video_id, language_code) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_version_content_hash ON subtitle_version(content_hash);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS workflow_task (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL REFERENCES video(video_id) ON DELETE CASCADE,
            language_code TEXT NOT NULL,
            task_type TEXT NOT NULL,
            assignee TEXT,
            started_at TEXT,
            completed_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_task_video_language ON workflow_task(video_id, language_code);
        "#,
    )?;

    info!("Database schema created successfully");
    Ok(())
}

/// Migrate the schema from one version to another
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<()> {
    let mut current = from_version;

    if current < 1 {
        return Err(anyhow::anyhow!(
            "Unknown schema version: {}. Cannot migrate.",
            current
        ));
    }

    // v1 -> v2: tip generation used to validate cached tips
    if current < 2 {
        debug!("Migrating schema v1 -> v2");
        conn.execute_batch(
            "ALTER TABLE subtitle_language ADD COLUMN tip_generation INTEGER NOT NULL DEFAULT 0;",
        )?;
        current = 2;
    }

    set_schema_version(conn, current)?;
    info!("Schema migration completed to v{}", current);
    Ok(())
}

/// Drop all tables (for testing purposes only)
#[cfg(test)]
pub fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS workflow_task;
        DROP TABLE IF EXISTS subtitle_version;
        DROP TABLE IF EXISTS subtitle_language;
        DROP TABLE IF EXISTS video;
        DROP TABLE IF EXISTS schema_version;
        "#,
    )?;
    Ok(())
}
