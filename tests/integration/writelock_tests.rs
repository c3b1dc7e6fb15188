/*!
 * Integration tests for writelock leases
 */

use subledger::app_config::EngineConfig;
use subledger::engine::NewVersion;
use subledger::errors::EngineError;

use crate::common::{self, cues, write, VIDEO_ID};

/// Test that a held lock blocks other sessions and admits its holder
#[tokio::test]
async fn test_acquire_shouldExcludeOtherSessions() {
    let engine = common::create_engine().await;

    let lease = engine.acquire_writelock(VIDEO_ID, "en", "ann", "s-ann").await.unwrap();
    assert_eq!(lease.owner, "ann");
    assert_eq!(lease.language_code, "en");

    let rival = engine.acquire_writelock(VIDEO_ID, "en", "bob", "s-bob").await;
    match rival {
        Err(EngineError::LockConflict { owner, .. }) => assert_eq!(owner, "ann"),
        other => panic!("expected a lock conflict, got {:?}", other),
    }

    // Re-acquiring from the same session is allowed
    assert!(engine.acquire_writelock(VIDEO_ID, "en", "ann", "s-ann").await.is_ok());

    assert!(engine.can_write(VIDEO_ID, "en", Some("s-ann")).await.unwrap());
    assert!(!engine.can_write(VIDEO_ID, "en", Some("s-bob")).await.unwrap());
    assert!(engine.can_write(VIDEO_ID, "de", Some("s-bob")).await.unwrap());
}

/// Test that writes honour the lock holder
#[tokio::test]
async fn test_createVersion_underForeignLock_shouldConflict() {
    let engine = common::create_engine().await;
    engine.acquire_writelock(VIDEO_ID, "en", "ann", "s-ann").await.unwrap();

    let blocked = engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["x"]), "bob").with_session("s-bob"))
        .await;
    assert!(matches!(blocked, Err(EngineError::LockConflict { .. })));

    let anonymous = engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["x"]), "bob"))
        .await;
    assert!(matches!(anonymous, Err(EngineError::LockConflict { .. })));

    let rollback = engine.rollback(VIDEO_ID, "en", 1, "bob").await;
    assert!(matches!(rollback, Err(EngineError::LockConflict { .. })));

    let allowed = engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["x"]), "ann").with_session("s-ann"))
        .await
        .unwrap();
    assert_eq!(allowed.unwrap().version_number, 1);
}

/// Test that release frees the lock for others
#[tokio::test]
async fn test_release_shouldLetOthersIn() {
    let engine = common::create_engine().await;

    let lease = engine.acquire_writelock(VIDEO_ID, "en", "ann", "s-ann").await.unwrap();
    assert!(engine.release_writelock(&lease).await.unwrap());
    assert!(!engine.release_writelock(&lease).await.unwrap());
    assert!(engine.language(VIDEO_ID, "en").await.unwrap().writelock.is_none());

    let bob = engine.acquire_writelock(VIDEO_ID, "en", "bob", "s-bob").await.unwrap();
    assert_eq!(bob.owner, "bob");

    // ann's old lease can no longer be renewed
    assert!(matches!(
        engine.renew_writelock(&lease).await,
        Err(EngineError::LockConflict { .. })
    ));
    let renewed = engine.renew_writelock(&bob).await.unwrap();
    assert!(renewed.acquired_at >= bob.acquired_at);
}

/// Test that an expired lock can be taken over
#[tokio::test]
async fn test_acquire_afterTtl_shouldTakeOver() {
    let config = EngineConfig {
        writelock_ttl_secs: 1,
        ..EngineConfig::default()
    };
    let engine = common::create_engine_with_config(config).await;

    engine.acquire_writelock(VIDEO_ID, "en", "ann", "s-ann").await.unwrap();
    assert!(engine.acquire_writelock(VIDEO_ID, "en", "bob", "s-bob").await.is_err());

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let lease = engine.acquire_writelock(VIDEO_ID, "en", "bob", "s-bob").await.unwrap();
    assert_eq!(lease.owner, "bob");
    write(&engine, "de", &["unrelated"]).await;
}

/// Test strict mode, where writers must hold the lease
#[tokio::test]
async fn test_createVersion_withRequiredLease_shouldDemandOwnLock() {
    let config = EngineConfig {
        require_writelock: true,
        ..EngineConfig::default()
    };
    let engine = common::create_engine_with_config(config).await;

    let unlocked = engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["x"]), "ann").with_session("s-ann"))
        .await;
    match unlocked {
        Err(EngineError::LockConflict { owner, .. }) => assert_eq!(owner, "nobody"),
        other => panic!("expected a lock conflict, got {:?}", other),
    }

    engine.acquire_writelock(VIDEO_ID, "en", "ann", "s-ann").await.unwrap();
    let locked = engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["x"]), "ann").with_session("s-ann"))
        .await
        .unwrap();
    assert!(locked.is_some());

    let restored = engine
        .rollback_in_session(VIDEO_ID, "en", 1, "ann", "s-ann")
        .await
        .unwrap();
    assert_eq!(restored.version_number, 2);
}

/// Test that locks need a registered video
#[tokio::test]
async fn test_acquire_withUnknownVideo_shouldBeNotFound() {
    let engine = common::create_engine().await;
    let result = engine.acquire_writelock("ghost", "en", "ann", "s1").await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}
