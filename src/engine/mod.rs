/*!
 * The subtitle version/lineage engine.
 *
 * This module provides the components that keep the append-only record of
 * subtitle edits:
 * - `version_store`: immutable, gaplessly numbered versions
 * - `lineage`: frozen translation provenance and staleness
 * - `tip_resolver`: current version per visibility mode, cached
 * - `fork`: severing a translation from its sources
 * - `rollback`: restoring older content by appending
 * - `purger`: bulk deletion of a language
 * - `writelock`: per-language editing leases
 * - `events`: notifications dispatched after commit
 *
 * [`SubtitleEngine`] wires them together over one repository.
 */

pub mod events;
pub mod fork;
pub mod lineage;
pub mod purger;
pub mod rollback;
pub mod tip_resolver;
pub mod version_store;
pub mod writelock;

use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::app_config::{Config, EngineConfig};
use crate::database::models::{
    format_timestamp, Lineage, SubtitleLanguage, SubtitleVersion, TipMode, VideoRecord, Visibility,
};
use crate::database::{DatabaseConnection, Repository};
use crate::errors::{EngineError, EngineResult};
use crate::language_utils::normalize_language_code;

pub use events::{EngineEvent, EventDispatcher, EventKind, EventListener};
pub use fork::ForkManager;
pub use lineage::{LineageStatus, LineageTracker, SourceRef};
pub use purger::{LanguagePurger, PurgeReport};
pub use rollback::RollbackEngine;
pub use tip_resolver::TipResolver;
pub use version_store::{NewVersion, VersionStore};
pub use writelock::{WriteLease, WriteLocks};

/// Facade over the engine components sharing one repository
#[derive(Clone)]
pub struct SubtitleEngine {
    repo: Repository,
    events: EventDispatcher,
    tips: TipResolver,
    store: VersionStore,
    lineage: LineageTracker,
    forks: ForkManager,
    rollbacks: RollbackEngine,
    purger: LanguagePurger,
    locks: WriteLocks,
}

impl SubtitleEngine {
    pub fn new(repo: Repository, config: EngineConfig) -> Self {
        let events = EventDispatcher::new();
        let tips = TipResolver::new(repo.clone(), config.tip_cache_enabled);
        let store = VersionStore::new(repo.clone(), events.clone(), config.clone());

        Self {
            lineage: LineageTracker::new(repo.clone()),
            forks: ForkManager::new(repo.clone(), events.clone()),
            rollbacks: RollbackEngine::new(store.clone()),
            purger: LanguagePurger::new(repo.clone(), tips.clone(), events.clone()),
            locks: WriteLocks::new(repo.clone(), config.writelock_ttl()),
            repo,
            events,
            tips,
            store,
        }
    }

    /// Open the database named by the configuration
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let path = match &config.database.path {
            Some(path) => path.clone(),
            None => DatabaseConnection::default_database_path()?,
        };
        let db = DatabaseConnection::with_busy_timeout(&path, config.database.busy_timeout_ms)?;
        Ok(Self::new(Repository::new(db), config.engine.clone()))
    }

    /// Engine over a fresh in-memory database
    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(Repository::new_in_memory()?, EngineConfig::default()))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Register a listener for engine events
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.events.subscribe(listener);
    }

    // =========================================================================
    // Videos and languages
    // =========================================================================

    /// Register a video; registering it again keeps the original record
    pub async fn register_video(
        &self,
        video_id: &str,
        primary_audio_language_code: Option<&str>,
    ) -> EngineResult<VideoRecord> {
        let primary = primary_audio_language_code
            .map(normalize_language_code)
            .transpose()?;
        let record = VideoRecord {
            video_id: video_id.to_string(),
            primary_audio_language_code: primary,
            created_at: format_timestamp(Utc::now()),
        };

        let video = self
            .repo
            .db()
            .transaction_async(move |tx| {
                if Repository::insert_video_sync(tx, &record)? {
                    info!("Registered video {}", record.video_id);
                }
                Repository::get_video_sync(tx, &record.video_id)?
                    .ok_or_else(|| anyhow::anyhow!("Video {} vanished after insert", record.video_id))
            })
            .await?;

        Ok(video)
    }

    pub async fn get_video(&self, video_id: &str) -> EngineResult<Option<VideoRecord>> {
        Ok(self.repo.get_video(video_id).await?)
    }

    /// Create an empty language for a registered video
    pub async fn ensure_language(&self, video_id: &str, language_code: &str) -> EngineResult<SubtitleLanguage> {
        let language_code = normalize_language_code(language_code)?;
        let video_id = video_id.to_string();

        let language = self
            .repo
            .db()
            .transaction_async(move |tx| {
                if Repository::get_video_sync(tx, &video_id)?.is_none() {
                    return Err(EngineError::NotFound(format!("video {}", video_id)).into());
                }
                Repository::ensure_language_sync(tx, &video_id, &language_code, &format_timestamp(Utc::now()))
            })
            .await?;

        Ok(language)
    }

    pub async fn language(&self, video_id: &str, language_code: &str) -> EngineResult<SubtitleLanguage> {
        let language_code = normalize_language_code(language_code)?;
        self.repo
            .get_language(video_id, &language_code)
            .await?
            .ok_or_else(|| EngineError::language_not_found(video_id, &language_code))
    }

    pub async fn languages(&self, video_id: &str) -> EngineResult<Vec<SubtitleLanguage>> {
        Ok(self.repo.list_languages(video_id).await?)
    }

    // =========================================================================
    // Versions
    // =========================================================================

    pub async fn create_version(&self, request: NewVersion) -> EngineResult<Option<SubtitleVersion>> {
        self.store.create_version(request).await
    }

    pub async fn get_tip(
        &self,
        video_id: &str,
        language_code: &str,
        mode: TipMode,
    ) -> EngineResult<Option<SubtitleVersion>> {
        self.tips.get_tip(video_id, language_code, mode).await
    }

    pub async fn get_version(
        &self,
        video_id: &str,
        language_code: &str,
        version_number: i64,
    ) -> EngineResult<SubtitleVersion> {
        let language_code = normalize_language_code(language_code)?;
        self.repo
            .get_version(video_id, &language_code, version_number)
            .await?
            .ok_or_else(|| EngineError::version_not_found(video_id, &language_code, version_number))
    }

    /// All versions of a language, oldest first
    pub async fn list_versions(&self, video_id: &str, language_code: &str) -> EngineResult<Vec<SubtitleVersion>> {
        let language = self.language(video_id, language_code).await?;
        Ok(self.repo.list_versions(video_id, &language.language_code).await?)
    }

    pub async fn set_visibility_override(
        &self,
        video_id: &str,
        language_code: &str,
        version_number: i64,
        visibility_override: Option<Visibility>,
    ) -> EngineResult<SubtitleVersion> {
        self.store
            .set_visibility_override(video_id, language_code, version_number, visibility_override)
            .await
    }

    // =========================================================================
    // Lineage, fork, rollback, purge
    // =========================================================================

    pub async fn get_lineage(&self, video_id: &str, language_code: &str, version_number: i64) -> EngineResult<Lineage> {
        self.lineage.get_lineage(video_id, language_code, version_number).await
    }

    pub async fn compute_lineage(
        &self,
        video_id: &str,
        language_code: &str,
        source_refs: &[SourceRef],
    ) -> EngineResult<Lineage> {
        self.lineage.compute_lineage(video_id, language_code, source_refs).await
    }

    pub async fn staleness(&self, video_id: &str, language_code: &str) -> EngineResult<Vec<LineageStatus>> {
        self.lineage.staleness(video_id, language_code).await
    }

    pub async fn fork(&self, video_id: &str, language_code: &str) -> EngineResult<SubtitleLanguage> {
        self.forks.fork(video_id, language_code).await
    }

    pub async fn rollback(
        &self,
        video_id: &str,
        language_code: &str,
        target_version: i64,
        author: &str,
    ) -> EngineResult<SubtitleVersion> {
        self.rollbacks
            .rollback(video_id, language_code, target_version, author)
            .await
    }

    pub async fn rollback_in_session(
        &self,
        video_id: &str,
        language_code: &str,
        target_version: i64,
        author: &str,
        session_key: &str,
    ) -> EngineResult<SubtitleVersion> {
        self.rollbacks
            .rollback_in_session(video_id, language_code, target_version, author, Some(session_key))
            .await
    }

    pub async fn nuke_language(&self, video_id: &str, language_code: &str) -> EngineResult<PurgeReport> {
        self.purger.nuke_language(video_id, language_code).await
    }

    // =========================================================================
    // Writelocks
    // =========================================================================

    pub async fn acquire_writelock(
        &self,
        video_id: &str,
        language_code: &str,
        owner: &str,
        session_key: &str,
    ) -> EngineResult<WriteLease> {
        self.locks.acquire(video_id, language_code, owner, session_key).await
    }

    pub async fn renew_writelock(&self, lease: &WriteLease) -> EngineResult<WriteLease> {
        self.locks.renew(lease).await
    }

    pub async fn release_writelock(&self, lease: &WriteLease) -> EngineResult<bool> {
        self.locks.release(lease).await
    }

    pub async fn can_write(&self, video_id: &str, language_code: &str, session_key: Option<&str>) -> EngineResult<bool> {
        self.locks.can_write(video_id, language_code, session_key).await
    }

    pub fn writelock_ttl(&self) -> chrono::Duration {
        self.locks.ttl()
    }

    /// Tip cache hits, misses and hit rate
    pub fn tip_cache_stats(&self) -> (usize, usize, f64) {
        self.tips.stats()
    }
}
