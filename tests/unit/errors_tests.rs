/*!
 * Tests for engine error types
 */

use subledger::errors::{is_unique_violation, EngineError};

/// Test error messages carry the identifying fields
#[test]
fn test_display_shouldNameTheLanguage() {
    let conflict = EngineError::LockConflict {
        video_id: "v1".to_string(),
        language_code: "fr".to_string(),
        owner: "bob".to_string(),
    };
    assert_eq!(conflict.to_string(), "Language v1/fr is locked by bob");

    let missing = EngineError::version_not_found("v1", "fr", 4);
    assert_eq!(missing.to_string(), "Not found: version 4 of v1/fr");
}

/// Test which errors are worth retrying
#[test]
fn test_isRecoverable_shouldCoverStaleVersions() {
    let stale = EngineError::StaleVersion {
        video_id: "v1".to_string(),
        language_code: "en".to_string(),
        version_number: 3,
    };
    assert!(stale.is_recoverable());
    assert!(!EngineError::NotFound("x".to_string()).is_recoverable());
    assert!(!EngineError::PermissionDenied("x".to_string()).is_recoverable());
}

/// Test unique violations are recognised from SQLite failures
#[test]
fn test_isUniqueViolation_withSqliteConstraint_shouldDetect() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, k TEXT UNIQUE); INSERT INTO t (k) VALUES ('a');")
        .unwrap();

    let duplicate = conn
        .execute("INSERT INTO t (k) VALUES ('a')", [])
        .map_err(anyhow::Error::from)
        .unwrap_err();
    assert!(is_unique_violation(&duplicate));

    let other = anyhow::anyhow!("something else");
    assert!(!is_unique_violation(&other));
}

/// Test typed errors survive a trip through anyhow
#[test]
fn test_fromAnyhow_withLockConflict_shouldKeepOwner() {
    let wrapped: anyhow::Error = EngineError::LockConflict {
        video_id: "v1".to_string(),
        language_code: "en".to_string(),
        owner: "ann".to_string(),
    }
    .into();

    match EngineError::from(wrapped) {
        EngineError::LockConflict { owner, .. } => assert_eq!(owner, "ann"),
        other => panic!("unexpected error: {:?}", other),
    }
}
