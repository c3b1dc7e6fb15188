/*!
 * Error types for the subledger engine.
 *
 * Engine operations return `EngineError` so that callers can tell a
 * recoverable conflict from bad input or a missing record. The database
 * layer works with `anyhow::Result`; typed errors raised inside a
 * transaction travel through `anyhow` and are recovered by downcast in
 * the `From<anyhow::Error>` conversion below.
 */

use thiserror::Error;

/// Result alias used by the engine components
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the version/lineage engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Another session holds an unexpired writelock on the language
    #[error("Language {video_id}/{language_code} is locked by {owner}")]
    LockConflict {
        /// Video the lock belongs to
        video_id: String,
        /// Locked language
        language_code: String,
        /// Current lock owner
        owner: String,
    },

    /// A concurrent writer claimed the version number first
    #[error("Version {version_number} of {video_id}/{language_code} was claimed by a concurrent writer")]
    StaleVersion {
        video_id: String,
        language_code: String,
        version_number: i64,
    },

    /// Cues failed validation; nothing was written
    #[error("Invalid subtitle data: {0}")]
    InvalidSubtitleData(String),

    /// Language code is not a recognised ISO 639 code
    #[error("Invalid language code: {0}")]
    InvalidLanguageCode(String),

    /// Video, language or version does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Visibility rule violated
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Any storage-level failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Whether the caller can retry after refreshing its view
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::LockConflict { .. } | EngineError::StaleVersion { .. }
        )
    }

    /// Shorthand for a missing language
    pub fn language_not_found(video_id: &str, language_code: &str) -> Self {
        EngineError::NotFound(format!("language {}/{}", video_id, language_code))
    }

    /// Shorthand for a missing version
    pub fn version_not_found(video_id: &str, language_code: &str, version_number: i64) -> Self {
        EngineError::NotFound(format!(
            "version {} of {}/{}",
            version_number, video_id, language_code
        ))
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<EngineError>() {
            Ok(engine_error) => engine_error,
            Err(other) => match other.downcast_ref::<rusqlite::Error>() {
                Some(rusqlite::Error::SqliteFailure(failure, _))
                    if failure.code == rusqlite::ErrorCode::DatabaseBusy =>
                {
                    EngineError::Storage(format!("database busy: {}", other))
                }
                _ => EngineError::Storage(format!("{:#}", other)),
            },
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(error: rusqlite::Error) -> Self {
        EngineError::Storage(error.to_string())
    }
}

/// Returns true when the error is a unique constraint violation
pub fn is_unique_violation(error: &anyhow::Error) -> bool {
    match error.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(failure, _)) => {
            failure.code == rusqlite::ErrorCode::ConstraintViolation
                && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}
