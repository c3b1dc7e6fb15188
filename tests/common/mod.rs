/*!
 * Common test utilities for the subledger test suite
 */

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use subledger::app_config::EngineConfig;
use subledger::database::Repository;
use subledger::engine::{EngineEvent, EventListener, NewVersion, SubtitleEngine};
use subledger::subtitle_set::{Cue, SubtitleSet};
use subledger::SubtitleVersion;

/// Video registered by `create_engine`
pub const VIDEO_ID: &str = "video-1";

/// Routes engine logs through the test harness; `RUST_LOG` picks the level
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Builds a cue set with one-second cues carrying the given texts
pub fn cues(texts: &[&str]) -> SubtitleSet {
    SubtitleSet::from_cues(
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| Cue::new(i as i64 * 1000, i as i64 * 1000 + 900, *text))
            .collect(),
    )
}

/// In-memory engine with `VIDEO_ID` registered
pub async fn create_engine() -> SubtitleEngine {
    create_engine_with_config(EngineConfig::default()).await
}

/// In-memory engine with a custom configuration and `VIDEO_ID` registered
pub async fn create_engine_with_config(config: EngineConfig) -> SubtitleEngine {
    init_logging();
    let repo = Repository::new_in_memory().expect("Failed to create in-memory repository");
    let engine = SubtitleEngine::new(repo, config);
    engine
        .register_video(VIDEO_ID, Some("en"))
        .await
        .expect("Failed to register test video");
    engine
}

/// Writes cues to a language of `VIDEO_ID` and returns the created version
pub async fn write(engine: &SubtitleEngine, language_code: &str, texts: &[&str]) -> SubtitleVersion {
    engine
        .create_version(NewVersion::new(VIDEO_ID, language_code, cues(texts), "tester"))
        .await
        .expect("Write failed")
        .expect("Write was treated as a no-op")
}

/// Listener remembering every event it sees
#[derive(Default)]
pub struct EventRecorder {
    pub events: Mutex<Vec<EngineEvent>>,
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|event| event.name()).collect()
    }
}

#[async_trait]
impl EventListener for EventRecorder {
    fn name(&self) -> &str {
        "event-recorder"
    }

    async fn on_event(&self, event: &EngineEvent) -> anyhow::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
