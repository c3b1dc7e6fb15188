/*!
 * Repository layer for database operations.
 *
 * This module provides a high-level API for all database operations,
 * abstracting away the SQL details and providing type-safe access.
 *
 * The `*_sync` functions take a plain connection so the engine can compose
 * them inside a single transaction; the async methods wrap them for
 * standalone reads.
 */

use std::collections::BTreeSet;

use anyhow::Result;
use log::debug;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;

use super::connection::DatabaseConnection;
use super::models::{
    parse_timestamp, Lineage, SubtitleLanguage, SubtitleVersion, TaskRecord, TaskType, TipMode,
    TipStamp, VideoRecord, Visibility, WriteLock,
};
use crate::subtitle_set::SubtitleSet;

const VERSION_COLUMNS: &str = r#"
    video_id, language_code, version_number, author, created, visibility,
    visibility_override, content, content_hash, lineage, rollback_of,
    title, description, subtitle_count
"#;

const LANGUAGE_COLUMNS: &str = r#"
    video_id, language_code, is_forked, subtitles_complete, severed_sources,
    writelock_owner, writelock_session_key, writelock_time, created
"#;

const TASK_COLUMNS: &str = r#"
    id, video_id, language_code, task_type, assignee, started_at, completed_at, created_at
"#;

/// SQL fragment selecting versions visible to the public
const PUBLIC_FILTER: &str = "COALESCE(visibility_override, visibility) = 'public'";

/// Read a JSON text column into a typed value
fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a text column through `FromStr`
fn parsed_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: anyhow::Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

fn version_from_row(row: &Row) -> rusqlite::Result<SubtitleVersion> {
    let content: SubtitleSet = json_column(row, 7)?;
    let lineage: Lineage = json_column(row, 9)?;
    let visibility_override = match row.get::<_, Option<String>>(6)? {
        Some(raw) => Some(raw.parse::<Visibility>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into())
        })?),
        None => None,
    };

    Ok(SubtitleVersion {
        video_id: row.get(0)?,
        language_code: row.get(1)?,
        version_number: row.get(2)?,
        author: row.get(3)?,
        created: row.get(4)?,
        visibility: parsed_column(row, 5)?,
        visibility_override,
        content,
        content_hash: row.get(8)?,
        lineage,
        rollback_of: row.get(10)?,
        title: row.get(11)?,
        description: row.get(12)?,
        subtitle_count: row.get(13)?,
    })
}

fn language_from_row(row: &Row) -> rusqlite::Result<SubtitleLanguage> {
    let owner: Option<String> = row.get(5)?;
    let session_key: Option<String> = row.get(6)?;
    let locked_at: Option<String> = row.get(7)?;

    let writelock = match (owner, session_key, locked_at.as_deref().and_then(parse_timestamp)) {
        (Some(owner), Some(session_key), Some(acquired_at)) => Some(WriteLock {
            owner,
            session_key,
            acquired_at,
        }),
        _ => None,
    };

    Ok(SubtitleLanguage {
        video_id: row.get(0)?,
        language_code: row.get(1)?,
        is_forked: row.get::<_, i32>(2)? != 0,
        subtitles_complete: row.get::<_, i32>(3)? != 0,
        severed_sources: json_column(row, 4)?,
        writelock,
        created: row.get(8)?,
    })
}

fn task_from_row(row: &Row) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0)?,
        video_id: row.get(1)?,
        language_code: row.get(2)?,
        task_type: parsed_column::<TaskType>(row, 3)?,
        assignee: row.get(4)?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new_default()?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// Underlying connection, for composing transactions
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Video Operations
    // =========================================================================

    /// Insert a video if it is not registered yet; returns true when inserted
    pub fn insert_video_sync(conn: &Connection, video: &VideoRecord) -> Result<bool> {
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO video (video_id, primary_audio_language_code, created_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![
                video.video_id,
                video.primary_audio_language_code,
                video.created_at,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Get a video by ID
    pub fn get_video_sync(conn: &Connection, video_id: &str) -> Result<Option<VideoRecord>> {
        let video = conn
            .query_row(
                "SELECT video_id, primary_audio_language_code, created_at FROM video WHERE video_id = ?1",
                [video_id],
                |row| {
                    Ok(VideoRecord {
                        video_id: row.get(0)?,
                        primary_audio_language_code: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(video)
    }

    /// Get a video by ID
    pub async fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        let video_id = video_id.to_string();
        self.db
            .execute_async(move |conn| Self::get_video_sync(conn, &video_id))
            .await
    }

    // =========================================================================
    // Language Operations
    // =========================================================================

    /// Get a language row
    pub fn get_language_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
    ) -> Result<Option<SubtitleLanguage>> {
        let sql = format!(
            "SELECT {} FROM subtitle_language WHERE video_id = ?1 AND language_code = ?2",
            LANGUAGE_COLUMNS
        );
        let language = conn
            .query_row(&sql, params![video_id, language_code], language_from_row)
            .optional()?;
        Ok(language)
    }

    /// Get a language row
    pub async fn get_language(
        &self,
        video_id: &str,
        language_code: &str,
    ) -> Result<Option<SubtitleLanguage>> {
        let video_id = video_id.to_string();
        let language_code = language_code.to_string();
        self.db
            .execute_async(move |conn| Self::get_language_sync(conn, &video_id, &language_code))
            .await
    }

    /// Create the language row if missing and return it
    pub fn ensure_language_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
        created: &str,
    ) -> Result<SubtitleLanguage> {
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO subtitle_language (video_id, language_code, created)
            VALUES (?1, ?2, ?3)
            "#,
            params![video_id, language_code, created],
        )?;

        if inserted > 0 {
            debug!("Created subtitle language {}/{}", video_id, language_code);
        }

        Self::get_language_sync(conn, video_id, language_code)?
            .ok_or_else(|| anyhow::anyhow!("Language {}/{} vanished after insert", video_id, language_code))
    }

    /// List all languages of a video
    pub fn list_languages_sync(conn: &Connection, video_id: &str) -> Result<Vec<SubtitleLanguage>> {
        let sql = format!(
            "SELECT {} FROM subtitle_language WHERE video_id = ?1 ORDER BY language_code",
            LANGUAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let languages = stmt
            .query_map([video_id], language_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(languages)
    }

    /// List all languages of a video
    pub async fn list_languages(&self, video_id: &str) -> Result<Vec<SubtitleLanguage>> {
        let video_id = video_id.to_string();
        self.db
            .execute_async(move |conn| Self::list_languages_sync(conn, &video_id))
            .await
    }

    /// Update the completeness flag
    pub fn set_subtitles_complete_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
        complete: bool,
    ) -> Result<()> {
        conn.execute(
            "UPDATE subtitle_language SET subtitles_complete = ?1 WHERE video_id = ?2 AND language_code = ?3",
            params![complete as i32, video_id, language_code],
        )?;
        Ok(())
    }

    /// Current tip stamp of a language, `None` if the language is absent
    pub fn tip_stamp_sync(conn: &Connection, video_id: &str, language_code: &str) -> Result<Option<TipStamp>> {
        let stamp = conn
            .query_row(
                "SELECT id, tip_generation FROM subtitle_language WHERE video_id = ?1 AND language_code = ?2",
                params![video_id, language_code],
                |row| {
                    Ok(TipStamp {
                        language_id: row.get(0)?,
                        generation: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(stamp)
    }

    /// Mark the tips of a language as changed; call in the committing transaction
    pub fn bump_tip_generation_sync(conn: &Connection, video_id: &str, language_code: &str) -> Result<()> {
        conn.execute(
            "UPDATE subtitle_language SET tip_generation = tip_generation + 1 WHERE video_id = ?1 AND language_code = ?2",
            params![video_id, language_code],
        )?;
        Ok(())
    }

    /// Flag a language as forked and record the severed sources
    pub fn mark_forked_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
        severed_sources: &[String],
    ) -> Result<usize> {
        let severed = serde_json::to_string(severed_sources)?;
        let updated = conn.execute(
            r#"
            UPDATE subtitle_language
            SET is_forked = 1, severed_sources = ?1
            WHERE video_id = ?2 AND language_code = ?3 AND is_forked = 0
            "#,
            params![severed, video_id, language_code],
        )?;
        Ok(updated)
    }

    /// Compare-and-set acquisition of the writelock.
    ///
    /// A single UPDATE succeeds only if the lock is free, older than
    /// `expired_before`, or already held by `session_key`. Returns the
    /// number of rows changed (0 or 1).
    pub fn try_acquire_writelock_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
        owner: &str,
        session_key: &str,
        now: &str,
        expired_before: &str,
    ) -> Result<usize> {
        let updated = conn.execute(
            r#"
            UPDATE subtitle_language
            SET writelock_owner = ?1, writelock_session_key = ?2, writelock_time = ?3
            WHERE video_id = ?4 AND language_code = ?5
              AND (writelock_session_key IS NULL
                   OR writelock_time IS NULL
                   OR writelock_time <= ?6
                   OR writelock_session_key = ?2)
            "#,
            params![owner, session_key, now, video_id, language_code, expired_before],
        )?;
        Ok(updated)
    }

    /// Refresh the lock timestamp if `session_key` still holds it
    pub fn renew_writelock_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
        session_key: &str,
        now: &str,
    ) -> Result<usize> {
        let updated = conn.execute(
            r#"
            UPDATE subtitle_language SET writelock_time = ?1
            WHERE video_id = ?2 AND language_code = ?3 AND writelock_session_key = ?4
            "#,
            params![now, video_id, language_code, session_key],
        )?;
        Ok(updated)
    }

    /// Clear the lock if `session_key` holds it
    pub fn release_writelock_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
        session_key: &str,
    ) -> Result<usize> {
        let updated = conn.execute(
            r#"
            UPDATE subtitle_language
            SET writelock_owner = NULL, writelock_session_key = NULL, writelock_time = NULL
            WHERE video_id = ?1 AND language_code = ?2 AND writelock_session_key = ?3
            "#,
            params![video_id, language_code, session_key],
        )?;
        Ok(updated)
    }

    /// Delete a language and all of its versions; returns the version count removed
    pub fn delete_language_sync(conn: &Connection, video_id: &str, language_code: &str) -> Result<usize> {
        let versions = conn.execute(
            "DELETE FROM subtitle_version WHERE video_id = ?1 AND language_code = ?2",
            params![video_id, language_code],
        )?;
        conn.execute(
            "DELETE FROM subtitle_language WHERE video_id = ?1 AND language_code = ?2",
            params![video_id, language_code],
        )?;
        Ok(versions)
    }

    // =========================================================================
    // Version Operations
    // =========================================================================

    /// Highest version number stored for a language
    pub fn max_version_number_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
    ) -> Result<Option<i64>> {
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(version_number) FROM subtitle_version WHERE video_id = ?1 AND language_code = ?2",
            params![video_id, language_code],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Insert a new version row
    pub fn insert_version_sync(conn: &Connection, version: &SubtitleVersion) -> Result<()> {
        let content = serde_json::to_string(&version.content)?;
        let lineage = serde_json::to_string(&version.lineage)?;

        conn.execute(
            r#"
            INSERT INTO subtitle_version (
                video_id, language_code, version_number, author, created, visibility,
                visibility_override, content, content_hash, lineage, rollback_of,
                title, description, subtitle_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                version.video_id,
                version.language_code,
                version.version_number,
                version.author,
                version.created,
                version.visibility.to_string(),
                version.visibility_override.map(|v| v.to_string()),
                content,
                version.content_hash,
                lineage,
                version.rollback_of,
                version.title,
                version.description,
                version.subtitle_count,
            ],
        )?;
        Ok(())
    }

    /// Get a single version
    pub fn get_version_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
        version_number: i64,
    ) -> Result<Option<SubtitleVersion>> {
        let sql = format!(
            "SELECT {} FROM subtitle_version WHERE video_id = ?1 AND language_code = ?2 AND version_number = ?3",
            VERSION_COLUMNS
        );
        let version = conn
            .query_row(&sql, params![video_id, language_code, version_number], version_from_row)
            .optional()?;
        Ok(version)
    }

    /// Get a single version
    pub async fn get_version(
        &self,
        video_id: &str,
        language_code: &str,
        version_number: i64,
    ) -> Result<Option<SubtitleVersion>> {
        let video_id = video_id.to_string();
        let language_code = language_code.to_string();
        self.db
            .execute_async(move |conn| {
                Self::get_version_sync(conn, &video_id, &language_code, version_number)
            })
            .await
    }

    /// Latest version matching the tip filter, straight from storage
    pub fn get_tip_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
        mode: TipMode,
    ) -> Result<Option<SubtitleVersion>> {
        let filter = match mode {
            TipMode::Full => "1 = 1",
            TipMode::Public => PUBLIC_FILTER,
        };
        let sql = format!(
            r#"
            SELECT {} FROM subtitle_version
            WHERE video_id = ?1 AND language_code = ?2 AND {}
            ORDER BY version_number DESC
            LIMIT 1
            "#,
            VERSION_COLUMNS, filter
        );
        let tip = conn
            .query_row(&sql, params![video_id, language_code], version_from_row)
            .optional()?;
        Ok(tip)
    }

    /// All versions of a language in ascending order
    pub fn list_versions_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
    ) -> Result<Vec<SubtitleVersion>> {
        let sql = format!(
            "SELECT {} FROM subtitle_version WHERE video_id = ?1 AND language_code = ?2 ORDER BY version_number",
            VERSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let versions = stmt
            .query_map(params![video_id, language_code], version_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(versions)
    }

    /// All versions of a language in ascending order
    pub async fn list_versions(
        &self,
        video_id: &str,
        language_code: &str,
    ) -> Result<Vec<SubtitleVersion>> {
        let video_id = video_id.to_string();
        let language_code = language_code.to_string();
        self.db
            .execute_async(move |conn| Self::list_versions_sync(conn, &video_id, &language_code))
            .await
    }

    /// Every language named in the lineage of any version of a language, sorted
    pub fn lineage_languages_sync(conn: &Connection, video_id: &str, language_code: &str) -> Result<Vec<String>> {
        let mut stmt =
            conn.prepare("SELECT lineage FROM subtitle_version WHERE video_id = ?1 AND language_code = ?2")?;
        let lineages = stmt
            .query_map(params![video_id, language_code], |row| json_column::<Lineage>(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let languages: BTreeSet<String> = lineages.into_iter().flat_map(Lineage::into_keys).collect();
        Ok(languages.into_iter().collect())
    }

    /// Set or clear the visibility override of one version
    pub fn set_visibility_override_sync(
        conn: &Connection,
        video_id: &str,
        language_code: &str,
        version_number: i64,
        visibility_override: Option<Visibility>,
    ) -> Result<usize> {
        let updated = conn.execute(
            r#"
            UPDATE subtitle_version SET visibility_override = ?1
            WHERE video_id = ?2 AND language_code = ?3 AND version_number = ?4
            "#,
            params![
                visibility_override.map(|v| v.to_string()),
                video_id,
                language_code,
                version_number
            ],
        )?;
        Ok(updated)
    }

    /// Languages of a video that have at least one public version
    pub fn languages_with_public_tip_sync(conn: &Connection, video_id: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT language_code FROM subtitle_version WHERE video_id = ?1 AND {} ORDER BY language_code",
            PUBLIC_FILTER
        );
        let mut stmt = conn.prepare(&sql)?;
        let languages = stmt
            .query_map([video_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(languages)
    }

    // =========================================================================
    // Task Operations
    // =========================================================================

    /// Insert a workflow task, returning its ID
    pub async fn insert_task(&self, task: &TaskRecord) -> Result<i64> {
        let task = task.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO workflow_task (
                        video_id, language_code, task_type, assignee, started_at, completed_at, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        task.video_id,
                        task.language_code,
                        task.task_type.to_string(),
                        task.assignee,
                        task.started_at,
                        task.completed_at,
                        task.created_at,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    /// All tasks of a video
    pub fn list_tasks_sync(conn: &Connection, video_id: &str) -> Result<Vec<TaskRecord>> {
        let sql = format!(
            "SELECT {} FROM workflow_task WHERE video_id = ?1 ORDER BY id",
            TASK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map([video_id], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// All tasks of a video
    pub async fn list_tasks(&self, video_id: &str) -> Result<Vec<TaskRecord>> {
        let video_id = video_id.to_string();
        self.db
            .execute_async(move |conn| Self::list_tasks_sync(conn, &video_id))
            .await
    }

    /// Delete tasks by ID
    pub fn delete_tasks_sync(conn: &Connection, task_ids: &[i64]) -> Result<usize> {
        let mut deleted = 0;
        for id in task_ids {
            deleted += conn.execute("DELETE FROM workflow_task WHERE id = ?1", [id])?;
        }
        Ok(deleted)
    }
}
