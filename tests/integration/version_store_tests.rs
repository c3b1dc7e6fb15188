/*!
 * Integration tests for version creation
 */

use subledger::engine::NewVersion;
use subledger::errors::EngineError;
use subledger::subtitle_set::{Cue, SubtitleSet};
use subledger::{TipMode, Visibility};

use crate::common::{self, cues, write, EventRecorder, VIDEO_ID};

/// Test that accepted writes are numbered 1..N without gaps
#[tokio::test]
async fn test_createVersion_withSequentialWrites_shouldNumberGaplessly() {
    let engine = common::create_engine().await;

    for i in 0..5 {
        let text = format!("revision {}", i);
        write(&engine, "en", &[text.as_str()]).await;
    }

    let numbers: Vec<i64> = engine
        .list_versions(VIDEO_ID, "en")
        .await
        .unwrap()
        .iter()
        .map(|version| version.version_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
}

/// Test that stored fields reflect the request
#[tokio::test]
async fn test_createVersion_shouldStoreRequestFields() {
    let engine = common::create_engine().await;

    let version = engine
        .create_version(
            NewVersion::new(VIDEO_ID, "EN", cues(&["Hello", "World"]), "ann")
                .with_visibility(Visibility::Private)
                .with_title("Pilot")
                .with_description("First cut"),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(version.language_code, "en");
    assert_eq!(version.version_number, 1);
    assert_eq!(version.author, "ann");
    assert_eq!(version.visibility, Visibility::Private);
    assert_eq!(version.visibility_override, None);
    assert_eq!(version.subtitle_count, 2);
    assert_eq!(version.title, "Pilot");
    assert_eq!(version.description, "First cut");
    assert_eq!(version.content_hash, version.content.content_hash().unwrap());
    assert!(version.lineage.is_empty());
    assert_eq!(version.rollback_of, None);

    let stored = engine.get_version(VIDEO_ID, "en", 1).await.unwrap();
    assert_eq!(stored, version);
}

/// Test that title and description carry over when not given
#[tokio::test]
async fn test_createVersion_withoutTitle_shouldInheritFromTip() {
    let engine = common::create_engine().await;

    engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["a"]), "ann").with_title("Kept"))
        .await
        .unwrap();
    let second = write(&engine, "en", &["b"]).await;

    assert_eq!(second.title, "Kept");
}

/// Test that an empty submission over an absent tip creates nothing
#[tokio::test]
async fn test_createVersion_withEmptySetAndNoTip_shouldBeNoOp() {
    let engine = common::create_engine().await;

    let result = engine
        .create_version(NewVersion::new(VIDEO_ID, "en", SubtitleSet::new(), "ann").complete(true))
        .await
        .unwrap();

    assert!(result.is_none());
    assert!(matches!(
        engine.language(VIDEO_ID, "en").await,
        Err(EngineError::NotFound(_))
    ));
}

/// Test that repeated empty submissions over an empty tip do not grow the history
#[tokio::test]
async fn test_createVersion_withEmptySetOverEmptyTip_shouldReturnExistingTip() {
    let engine = common::create_engine().await;

    write(&engine, "en", &["content"]).await;
    let emptied = engine
        .create_version(NewVersion::new(VIDEO_ID, "en", SubtitleSet::new(), "ann"))
        .await
        .unwrap()
        .expect("clearing non-empty content is a real edit");
    assert_eq!(emptied.version_number, 2);
    assert!(emptied.has_no_cues());

    for _ in 0..3 {
        let again = engine
            .create_version(NewVersion::new(VIDEO_ID, "en", SubtitleSet::new(), "ann").complete(true))
            .await
            .unwrap();
        assert_eq!(again, Some(emptied.clone()));
    }

    assert_eq!(engine.list_versions(VIDEO_ID, "en").await.unwrap().len(), 2);
    // The no-op leaves the language untouched as well
    assert!(!engine.language(VIDEO_ID, "en").await.unwrap().subtitles_complete);
}

/// Test that completeness is only changed when explicitly given
#[tokio::test]
async fn test_createVersion_withComplete_shouldOnlyUpdateWhenProvided() {
    let engine = common::create_engine().await;

    engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["a"]), "ann").complete(true))
        .await
        .unwrap();
    assert!(engine.language(VIDEO_ID, "en").await.unwrap().subtitles_complete);

    write(&engine, "en", &["b"]).await;
    assert!(engine.language(VIDEO_ID, "en").await.unwrap().subtitles_complete);

    engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["c"]), "ann").complete(false))
        .await
        .unwrap();
    assert!(!engine.language(VIDEO_ID, "en").await.unwrap().subtitles_complete);
}

/// Test that malformed cues are rejected with nothing written
#[tokio::test]
async fn test_createVersion_withMalformedCues_shouldWriteNothing() {
    let engine = common::create_engine().await;
    write(&engine, "en", &["ok"]).await;

    let bad = SubtitleSet::from_cues(vec![Cue::new(2000, 3000, "late"), Cue::new(0, 500, "early")]);
    let result = engine
        .create_version(NewVersion::new(VIDEO_ID, "en", bad, "ann").complete(true))
        .await;

    assert!(matches!(result, Err(EngineError::InvalidSubtitleData(_))));
    assert_eq!(engine.list_versions(VIDEO_ID, "en").await.unwrap().len(), 1);
    assert!(!engine.language(VIDEO_ID, "en").await.unwrap().subtitles_complete);
}

/// Test input validation failures
#[tokio::test]
async fn test_createVersion_withUnknownInputs_shouldFail() {
    let engine = common::create_engine().await;

    let bad_language = engine
        .create_version(NewVersion::new(VIDEO_ID, "klingon", cues(&["a"]), "ann"))
        .await;
    assert!(matches!(bad_language, Err(EngineError::InvalidLanguageCode(_))));

    let unknown_video = engine
        .create_version(NewVersion::new("nope", "en", cues(&["a"]), "ann"))
        .await;
    assert!(matches!(unknown_video, Err(EngineError::NotFound(_))));

    let missing_source = engine
        .create_version(NewVersion::new(VIDEO_ID, "fr", cues(&["a"]), "ann").translated_from("en", 9))
        .await;
    assert!(matches!(missing_source, Err(EngineError::NotFound(_))));
    assert!(engine.language(VIDEO_ID, "fr").await.is_err());
}

/// Test that visibility overrides are the only mutation and are announced
#[tokio::test]
async fn test_setVisibilityOverride_shouldUpdateAndEmitEvent() {
    let engine = common::create_engine().await;
    let recorder = EventRecorder::new();
    engine.subscribe(recorder.clone());

    let original = write(&engine, "en", &["a"]).await;
    let updated = engine
        .set_visibility_override(VIDEO_ID, "en", 1, Some(Visibility::Private))
        .await
        .unwrap();

    assert_eq!(updated.visibility_override, Some(Visibility::Private));
    assert_eq!(updated.content, original.content);
    assert_eq!(updated.lineage, original.lineage);
    assert!(engine.get_tip(VIDEO_ID, "en", TipMode::Public).await.unwrap().is_none());

    let cleared = engine.set_visibility_override(VIDEO_ID, "en", 1, None).await.unwrap();
    assert_eq!(cleared.effective_visibility(), Visibility::Public);

    let missing = engine.set_visibility_override(VIDEO_ID, "en", 7, None).await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));

    assert_eq!(
        recorder.names(),
        vec!["version.created", "version.visibility_changed", "version.visibility_changed"]
    );
}

/// Test that a created version is announced once after commit
#[tokio::test]
async fn test_createVersion_shouldEmitVersionCreated() {
    let engine = common::create_engine().await;
    let recorder = EventRecorder::new();
    engine.subscribe(recorder.clone());

    write(&engine, "en", &["a"]).await;
    engine
        .create_version(NewVersion::new(VIDEO_ID, "de", SubtitleSet::new(), "ann"))
        .await
        .unwrap();

    let events = recorder.events.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].video_id, VIDEO_ID);
    assert_eq!(events[0].language_code, "en");
    assert!(matches!(
        events[0].kind,
        subledger::engine::EventKind::VersionCreated { version_number: 1, rollback_of: None, .. }
    ));
}
