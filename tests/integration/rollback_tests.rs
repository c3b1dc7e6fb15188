/*!
 * Integration tests for rollback
 */

use subledger::engine::{EventKind, NewVersion};
use subledger::errors::EngineError;
use subledger::subtitle_set::SubtitleSet;
use subledger::{TipMode, Visibility};

use crate::common::{self, cues, write, EventRecorder, VIDEO_ID};

/// Test that rollback appends a copy of the target
#[tokio::test]
async fn test_rollback_shouldAppendCopyOfTarget() {
    let engine = common::create_engine().await;

    let v1 = engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["original"]), "ann").with_title("First"))
        .await
        .unwrap()
        .unwrap();
    write(&engine, "en", &["changed"]).await;
    write(&engine, "en", &["changed again"]).await;

    let restored = engine.rollback(VIDEO_ID, "en", 1, "bob").await.unwrap();

    assert_eq!(restored.version_number, 4);
    assert_eq!(restored.content, v1.content);
    assert_eq!(restored.content_hash, v1.content_hash);
    assert_eq!(restored.rollback_of, Some(1));
    assert_eq!(restored.author, "bob");
    assert_eq!(restored.title, "First");

    // The target itself is untouched
    assert_eq!(engine.get_version(VIDEO_ID, "en", 1).await.unwrap(), v1);
    let tip = engine.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap().unwrap();
    assert_eq!(tip, restored);
}

/// Test that a missing target fails without writing
#[tokio::test]
async fn test_rollback_withMissingTarget_shouldBeNotFound() {
    let engine = common::create_engine().await;
    write(&engine, "en", &["only"]).await;

    let result = engine.rollback(VIDEO_ID, "en", 5, "ann").await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
    assert_eq!(engine.list_versions(VIDEO_ID, "en").await.unwrap().len(), 1);

    let unknown_language = engine.rollback(VIDEO_ID, "fr", 1, "ann").await;
    assert!(matches!(unknown_language, Err(EngineError::NotFound(_))));
}

/// Test that rolling back to an empty version still appends
#[tokio::test]
async fn test_rollback_toEmptyVersion_shouldIgnoreIdempotenceRule() {
    let engine = common::create_engine().await;

    write(&engine, "en", &["content"]).await;
    engine
        .create_version(NewVersion::new(VIDEO_ID, "en", SubtitleSet::new(), "ann"))
        .await
        .unwrap()
        .unwrap();

    // Tip (v2) is empty and the target (v2) is empty: a rollback still appends
    let restored = engine.rollback(VIDEO_ID, "en", 2, "ann").await.unwrap();
    assert_eq!(restored.version_number, 3);
    assert!(restored.has_no_cues());
}

/// Test that rollback takes the target's visibility and recomputes lineage
#[tokio::test]
async fn test_rollback_shouldCopyVisibilityAndRecomputeLineage() {
    let engine = common::create_engine().await;

    write(&engine, "en", &["one"]).await;
    engine
        .create_version(
            NewVersion::new(VIDEO_ID, "fr", cues(&["un"]), "bob")
                .translated_from("en", 1)
                .with_visibility(Visibility::Private),
        )
        .await
        .unwrap();
    engine.fork(VIDEO_ID, "fr").await.unwrap();
    write(&engine, "fr", &["libre"]).await;

    let restored = engine.rollback(VIDEO_ID, "fr", 1, "bob").await.unwrap();

    assert_eq!(restored.visibility, Visibility::Private);
    // Recomputed under the fork, so the severed source is gone
    assert!(restored.lineage.is_empty());

    // Without a fork the recorded sources are kept
    let de_source = engine
        .create_version(NewVersion::new(VIDEO_ID, "de", cues(&["eins"]), "cy").translated_from("en", 1))
        .await
        .unwrap()
        .unwrap();
    write(&engine, "de", &["zwei"]).await;
    let de_restored = engine.rollback(VIDEO_ID, "de", 1, "cy").await.unwrap();
    assert_eq!(de_restored.lineage, de_source.lineage);
}

/// Test that rollback never touches completeness
#[tokio::test]
async fn test_rollback_shouldLeaveCompletenessAlone() {
    let engine = common::create_engine().await;

    engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["draft"]), "ann"))
        .await
        .unwrap();
    engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["done"]), "ann").complete(true))
        .await
        .unwrap();

    engine.rollback(VIDEO_ID, "en", 1, "ann").await.unwrap();
    assert!(engine.language(VIDEO_ID, "en").await.unwrap().subtitles_complete);
}

/// Test that rollback events carry the target
#[tokio::test]
async fn test_rollback_shouldEmitVersionCreatedWithTarget() {
    let engine = common::create_engine().await;
    write(&engine, "en", &["one"]).await;
    write(&engine, "en", &["two"]).await;

    let recorder = EventRecorder::new();
    engine.subscribe(recorder.clone());
    engine.rollback(VIDEO_ID, "en", 1, "ann").await.unwrap();

    let events = recorder.events.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].kind,
        EventKind::VersionCreated {
            version_number: 3,
            author: "ann".to_string(),
            rollback_of: Some(1),
        }
    );
}

/// Test that a translation can be rolled back after its source is purged
#[tokio::test]
async fn test_rollback_afterSourcePurge_shouldKeepFrozenLineage() {
    let engine = common::create_engine().await;

    write(&engine, "en", &["one"]).await;
    let es_v1 = engine
        .create_version(NewVersion::new(VIDEO_ID, "es", cues(&["uno"]), "bob").translated_from("en", 1))
        .await
        .unwrap()
        .unwrap();
    write(&engine, "es", &["otro"]).await;

    engine.nuke_language(VIDEO_ID, "en").await.unwrap();

    let restored = engine.rollback(VIDEO_ID, "es", 1, "bob").await.unwrap();
    assert_eq!(restored.version_number, 3);
    assert_eq!(restored.content, es_v1.content);
    assert_eq!(restored.lineage, es_v1.lineage);
    assert_eq!(restored.rollback_of, Some(1));
}
