/*!
 * Integration tests for tip resolution
 */

use subledger::app_config::EngineConfig;
use subledger::database::{DatabaseConnection, Repository};
use subledger::engine::{NewVersion, SubtitleEngine};
use subledger::errors::EngineError;
use subledger::{TipMode, Visibility};

use crate::common::{self, cues, write, VIDEO_ID};

/// Test the reviewed-draft scenario: override hides the only public version
#[tokio::test]
async fn test_getTip_withPrivateDraftsAndOverride_shouldFollowEffectiveVisibility() {
    let engine = common::create_engine().await;

    engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["draft"]), "ann").with_visibility(Visibility::Private))
        .await
        .unwrap();
    engine
        .create_version(
            NewVersion::new(VIDEO_ID, "en", cues(&["draft", "more"]), "ann")
                .with_visibility(Visibility::Private)
                .complete(true),
        )
        .await
        .unwrap();
    let v3 = engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["final"]), "reviewer").with_visibility(Visibility::Public))
        .await
        .unwrap()
        .unwrap();

    let full = engine.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap().unwrap();
    let public = engine.get_tip(VIDEO_ID, "en", TipMode::Public).await.unwrap().unwrap();
    assert_eq!(full, v3);
    assert_eq!(public, v3);

    engine
        .set_visibility_override(VIDEO_ID, "en", 3, Some(Visibility::Private))
        .await
        .unwrap();

    assert!(engine.get_tip(VIDEO_ID, "en", TipMode::Public).await.unwrap().is_none());
    let full = engine.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap().unwrap();
    assert_eq!(full.version_number, 3);
    assert_eq!(full.content, v3.content);
}

/// Test that the public tip is the highest public version below private ones
#[tokio::test]
async fn test_getTip_withPrivateHead_shouldReturnLatestPublic() {
    let engine = common::create_engine().await;

    write(&engine, "en", &["one"]).await;
    write(&engine, "en", &["two"]).await;
    engine
        .create_version(NewVersion::new(VIDEO_ID, "en", cues(&["three"]), "ann").with_visibility(Visibility::Private))
        .await
        .unwrap();

    let public = engine.get_tip(VIDEO_ID, "en", TipMode::Public).await.unwrap().unwrap();
    let full = engine.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap().unwrap();
    assert_eq!(public.version_number, 2);
    assert_eq!(full.version_number, 3);

    // An override can publish a private version
    engine
        .set_visibility_override(VIDEO_ID, "en", 3, Some(Visibility::Public))
        .await
        .unwrap();
    let public = engine.get_tip(VIDEO_ID, "en", TipMode::Public).await.unwrap().unwrap();
    assert_eq!(public.version_number, 3);
}

/// Test that an empty language and a missing language are distinct
#[tokio::test]
async fn test_getTip_withEmptyLanguage_shouldDifferFromMissingLanguage() {
    let engine = common::create_engine().await;

    engine.ensure_language(VIDEO_ID, "fr").await.unwrap();
    assert!(engine.get_tip(VIDEO_ID, "fr", TipMode::Full).await.unwrap().is_none());
    assert!(engine.get_tip(VIDEO_ID, "fr", TipMode::Public).await.unwrap().is_none());

    let missing = engine.get_tip(VIDEO_ID, "de", TipMode::Full).await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));
}

/// Test that cached tips are replaced as soon as a write commits
#[tokio::test]
async fn test_getTip_afterWrite_shouldNeverServeStaleCache() {
    let engine = common::create_engine().await;

    write(&engine, "en", &["one"]).await;
    for expected in 2..=4 {
        // Warm both modes
        engine.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap();
        engine.get_tip(VIDEO_ID, "en", TipMode::Public).await.unwrap();

        write(&engine, "en", &["next"]).await;

        let full = engine.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap().unwrap();
        let public = engine.get_tip(VIDEO_ID, "en", TipMode::Public).await.unwrap().unwrap();
        assert_eq!(full.version_number, expected);
        assert_eq!(public.version_number, expected);
    }

    let (hits, misses, _) = engine.tip_cache_stats();
    assert!(hits > 0, "warm reads should hit the cache");
    assert!(misses > 0);
}

/// Test that disabling the cache keeps results identical
#[tokio::test]
async fn test_getTip_withCacheDisabled_shouldStillResolve() {
    let config = EngineConfig {
        tip_cache_enabled: false,
        ..EngineConfig::default()
    };
    let engine = common::create_engine_with_config(config).await;

    write(&engine, "en", &["one"]).await;
    engine.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap();
    let tip = engine.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap().unwrap();

    assert_eq!(tip.version_number, 1);
    assert_eq!(engine.tip_cache_stats().0, 0);
}

/// Test that language codes are normalized on read
#[tokio::test]
async fn test_getTip_withDifferentSpelling_shouldFindLanguage() {
    let engine = common::create_engine().await;
    write(&engine, "pt-br", &["olá"]).await;

    let tip = engine.get_tip(VIDEO_ID, "PT_BR", TipMode::Full).await.unwrap().unwrap();
    assert_eq!(tip.language_code, "pt-br");
}

/// Opens a second engine over the same database file
fn shared_engines(path: &std::path::Path) -> (SubtitleEngine, SubtitleEngine) {
    let open = || SubtitleEngine::new(Repository::new(DatabaseConnection::new(path).unwrap()), EngineConfig::default());
    (open(), open())
}

/// Test that a commit through another connection replaces cached tips
#[tokio::test]
async fn test_getTip_afterCommitOnOtherConnection_shouldSeeNewTip() {
    let dir = common::create_temp_dir().unwrap();
    let (reader, writer) = shared_engines(&dir.path().join("shared.db"));
    reader.register_video(VIDEO_ID, None).await.unwrap();

    write(&writer, "en", &["one"]).await;
    let cached = reader.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap().unwrap();
    assert_eq!(cached.version_number, 1);
    reader.get_tip(VIDEO_ID, "en", TipMode::Public).await.unwrap();

    write(&writer, "en", &["two"]).await;
    let full = reader.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap().unwrap();
    assert_eq!(full.version_number, 2);

    writer
        .set_visibility_override(VIDEO_ID, "en", 2, Some(Visibility::Private))
        .await
        .unwrap();
    let public = reader.get_tip(VIDEO_ID, "en", TipMode::Public).await.unwrap().unwrap();
    assert_eq!(public.version_number, 1);

    // Unchanged storage is still served from the cache
    let (hits_before, _, _) = reader.tip_cache_stats();
    reader.get_tip(VIDEO_ID, "en", TipMode::Public).await.unwrap();
    assert_eq!(reader.tip_cache_stats().0, hits_before + 1);
}

/// Test that a purge and rewrite on another connection is never masked
#[tokio::test]
async fn test_getTip_afterPurgeOnOtherConnection_shouldFollowStorage() {
    let dir = common::create_temp_dir().unwrap();
    let (reader, writer) = shared_engines(&dir.path().join("shared.db"));
    reader.register_video(VIDEO_ID, None).await.unwrap();

    write(&writer, "en", &["old"]).await;
    reader.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap();

    writer.nuke_language(VIDEO_ID, "en").await.unwrap();
    assert!(matches!(
        reader.get_tip(VIDEO_ID, "en", TipMode::Full).await,
        Err(EngineError::NotFound(_))
    ));

    let fresh = write(&writer, "en", &["new"]).await;
    let tip = reader.get_tip(VIDEO_ID, "en", TipMode::Full).await.unwrap().unwrap();
    assert_eq!(tip, fresh);
}
