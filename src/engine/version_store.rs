/*!
 * Append-only version store.
 *
 * Every accepted write becomes an immutable version numbered one past the
 * current full tip. Number allocation, lineage, the completeness flag and
 * the tip generation bump all happen inside one IMMEDIATE transaction; the
 * unique index on (video, language, version) backs it up, and a violation
 * is retried with jittered backoff.
 */

use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use rand::Rng;

use super::events::{EngineEvent, EventDispatcher, EventKind};
use super::lineage::{compute_lineage_sync, inherit_lineage, SourceRef};
use super::writelock::check_write_access;
use crate::app_config::EngineConfig;
use crate::database::models::{
    format_timestamp, SubtitleVersion, TipMode, Visibility,
};
use crate::database::Repository;
use crate::errors::{is_unique_violation, EngineError, EngineResult};
use crate::language_utils::normalize_language_code;
use crate::subtitle_set::SubtitleSet;

/// A write request for one (video, language)
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub video_id: String,
    pub language_code: String,
    pub subtitles: SubtitleSet,
    pub author: String,
    pub source_refs: Vec<SourceRef>,
    pub visibility: Visibility,
    /// Only applied to the language when set
    pub complete: Option<bool>,
    /// Defaults to the previous tip's title
    pub title: Option<String>,
    /// Defaults to the previous tip's description
    pub description: Option<String>,
    /// Editing session, checked against the writelock
    pub session_key: Option<String>,
}

impl NewVersion {
    pub fn new(
        video_id: impl Into<String>,
        language_code: impl Into<String>,
        subtitles: SubtitleSet,
        author: impl Into<String>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            language_code: language_code.into(),
            subtitles,
            author: author.into(),
            source_refs: Vec::new(),
            visibility: Visibility::Public,
            complete: None,
            title: None,
            description: None,
            session_key: None,
        }
    }

    /// Record a version this edit was derived from
    pub fn translated_from(mut self, language_code: impl Into<String>, version_number: i64) -> Self {
        self.source_refs.push(SourceRef::new(language_code, version_number));
        self
    }

    pub fn with_source_refs(mut self, source_refs: Vec<SourceRef>) -> Self {
        self.source_refs = source_refs;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = Some(complete);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_session(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    /// Validate cues and normalize every language code
    fn prepared(mut self) -> EngineResult<Self> {
        self.subtitles.validate()?;
        self.language_code = normalize_language_code(&self.language_code)?;
        self.source_refs = self
            .source_refs
            .iter()
            .map(SourceRef::normalized)
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(self)
    }
}

/// A validated write plus how it is to be applied
#[derive(Debug, Clone)]
pub(crate) struct PreparedWrite {
    pub request: NewVersion,
    /// Restore this version's content, title, visibility and lineage
    pub rollback_of: Option<i64>,
    /// Whether the zero-cue rule may turn the write into a no-op
    pub allow_noop: bool,
}

impl PreparedWrite {
    pub fn edit(request: NewVersion) -> EngineResult<Self> {
        Ok(Self {
            request: request.prepared()?,
            rollback_of: None,
            allow_noop: true,
        })
    }

    pub fn rollback(request: NewVersion, target_version: i64) -> EngineResult<Self> {
        Ok(Self {
            request: request.prepared()?,
            rollback_of: Some(target_version),
            allow_noop: false,
        })
    }
}

/// Result of one committed write
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CommitOutcome {
    Created(SubtitleVersion),
    /// Zero-cue submission over an empty or absent tip
    Unchanged(Option<SubtitleVersion>),
}

/// Creates versions and applies visibility overrides
#[derive(Clone)]
pub struct VersionStore {
    repo: Repository,
    events: EventDispatcher,
    config: EngineConfig,
}

impl VersionStore {
    pub fn new(repo: Repository, events: EventDispatcher, config: EngineConfig) -> Self {
        Self { repo, events, config }
    }

    /// Append a version, or return the unchanged tip for an idempotent
    /// empty submission.
    pub async fn create_version(&self, request: NewVersion) -> EngineResult<Option<SubtitleVersion>> {
        match self.append(PreparedWrite::edit(request)?).await? {
            CommitOutcome::Created(version) => Ok(Some(version)),
            CommitOutcome::Unchanged(tip) => Ok(tip),
        }
    }

    /// Commit a prepared write, retrying lost number races
    pub(crate) async fn append(&self, write: PreparedWrite) -> EngineResult<CommitOutcome> {
        let mut attempt: u32 = 0;

        let outcome = loop {
            match self.commit_once(write.clone()).await {
                Err(EngineError::StaleVersion { version_number, .. })
                    if attempt < self.config.max_allocation_retries =>
                {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        "Version {} of {}/{} was taken concurrently, retry {}/{} in {:?}",
                        version_number,
                        write.request.video_id,
                        write.request.language_code,
                        attempt,
                        self.config.max_allocation_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                other => break other?,
            }
        };

        if let CommitOutcome::Created(version) = &outcome {
            info!(
                "Created version {} of {}/{} by {}{}",
                version.version_number,
                version.video_id,
                version.language_code,
                version.author,
                version
                    .rollback_of
                    .map(|n| format!(" (rollback of {})", n))
                    .unwrap_or_default()
            );
            self.events
                .dispatch(EngineEvent::new(
                    &version.video_id,
                    &version.language_code,
                    EventKind::VersionCreated {
                        version_number: version.version_number,
                        author: version.author.clone(),
                        rollback_of: version.rollback_of,
                    },
                ))
                .await;
        }

        Ok(outcome)
    }

    /// Exponential backoff with up to 50% jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .config
            .retry_backoff_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        let jitter = rand::rng().random_range(0..=base / 2);
        Duration::from_millis(base + jitter)
    }

    async fn commit_once(&self, write: PreparedWrite) -> EngineResult<CommitOutcome> {
        let require_lease = self.config.require_writelock;
        let ttl = self.config.writelock_ttl();

        let outcome = self
            .repo
            .db()
            .transaction_async(move |tx| {
                let PreparedWrite {
                    request,
                    rollback_of,
                    allow_noop,
                } = write;
                let video_id = request.video_id.as_str();
                let language_code = request.language_code.as_str();
                let now = Utc::now();

                if Repository::get_video_sync(tx, video_id)?.is_none() {
                    return Err(EngineError::NotFound(format!("video {}", video_id)).into());
                }

                let language = Repository::get_language_sync(tx, video_id, language_code)?;
                match &language {
                    Some(language) => {
                        check_write_access(language, request.session_key.as_deref(), require_lease, ttl, now)?
                    }
                    None if require_lease => {
                        return Err(EngineError::LockConflict {
                            video_id: video_id.to_string(),
                            language_code: language_code.to_string(),
                            owner: "nobody".to_string(),
                        }
                        .into());
                    }
                    None => {}
                }

                let tip = match &language {
                    Some(_) => Repository::get_tip_sync(tx, video_id, language_code, TipMode::Full)?,
                    None => None,
                };
                let severed = language
                    .as_ref()
                    .map(|language| language.severed_sources.clone())
                    .unwrap_or_default();

                // Rollbacks read the target inside this transaction so a
                // concurrent purge cannot slip between. Its lineage is taken
                // as frozen; the sources it names may be gone by now.
                let (content, title, description, visibility, lineage) = match rollback_of {
                    Some(target_number) => {
                        let target = Repository::get_version_sync(tx, video_id, language_code, target_number)?
                            .ok_or_else(|| EngineError::version_not_found(video_id, language_code, target_number))?;
                        let lineage = inherit_lineage(&target.lineage, language_code, &severed);
                        let visibility = target.effective_visibility();
                        (target.content, target.title, target.description, visibility, lineage)
                    }
                    None => {
                        if allow_noop
                            && request.subtitles.is_empty()
                            && tip.as_ref().is_none_or(SubtitleVersion::has_no_cues)
                        {
                            debug!(
                                "Empty submission over empty tip for {}/{}, nothing written",
                                video_id, language_code
                            );
                            return Ok(CommitOutcome::Unchanged(tip));
                        }
                        let title = request
                            .title
                            .clone()
                            .or_else(|| tip.as_ref().map(|t| t.title.clone()))
                            .unwrap_or_default();
                        let description = request
                            .description
                            .clone()
                            .or_else(|| tip.as_ref().map(|t| t.description.clone()))
                            .unwrap_or_default();
                        // An edit without sources stays derived from what the tip was
                        let lineage = if request.source_refs.is_empty() {
                            tip.as_ref()
                                .map(|t| inherit_lineage(&t.lineage, language_code, &severed))
                                .unwrap_or_default()
                        } else {
                            compute_lineage_sync(tx, video_id, language_code, &request.source_refs, &severed)?
                        };
                        (request.subtitles.clone(), title, description, request.visibility, lineage)
                    }
                };

                Repository::ensure_language_sync(tx, video_id, language_code, &format_timestamp(now))?;

                let version_number = Repository::max_version_number_sync(tx, video_id, language_code)?
                    .map_or(1, |max| max + 1);

                let version = SubtitleVersion {
                    video_id: video_id.to_string(),
                    language_code: language_code.to_string(),
                    version_number,
                    author: request.author.clone(),
                    created: format_timestamp(now),
                    visibility,
                    visibility_override: None,
                    content_hash: content.content_hash()?,
                    subtitle_count: content.len() as i64,
                    content,
                    lineage,
                    rollback_of,
                    title,
                    description,
                };

                if let Err(e) = Repository::insert_version_sync(tx, &version) {
                    if is_unique_violation(&e) {
                        return Err(EngineError::StaleVersion {
                            video_id: version.video_id,
                            language_code: version.language_code,
                            version_number,
                        }
                        .into());
                    }
                    return Err(e);
                }

                if let Some(complete) = request.complete {
                    Repository::set_subtitles_complete_sync(tx, video_id, language_code, complete)?;
                }

                Repository::bump_tip_generation_sync(tx, video_id, language_code)?;
                Ok(CommitOutcome::Created(version))
            })
            .await?;

        Ok(outcome)
    }

    /// Set or clear the manual visibility of one stored version
    pub async fn set_visibility_override(
        &self,
        video_id: &str,
        language_code: &str,
        version_number: i64,
        visibility_override: Option<Visibility>,
    ) -> EngineResult<SubtitleVersion> {
        let language_code = normalize_language_code(language_code)?;
        let video_id = video_id.to_string();

        let version = self
            .repo
            .db()
            .transaction_async(move |tx| {
                let updated = Repository::set_visibility_override_sync(
                    tx,
                    &video_id,
                    &language_code,
                    version_number,
                    visibility_override,
                )?;
                if updated == 0 {
                    return Err(EngineError::version_not_found(&video_id, &language_code, version_number).into());
                }

                Repository::bump_tip_generation_sync(tx, &video_id, &language_code)?;
                Repository::get_version_sync(tx, &video_id, &language_code, version_number)?.ok_or_else(|| {
                    anyhow::Error::from(EngineError::version_not_found(&video_id, &language_code, version_number))
                })
            })
            .await?;

        info!(
            "Visibility override of {}/{} version {} set to {}",
            version.video_id,
            version.language_code,
            version_number,
            visibility_override
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        self.events
            .dispatch(EngineEvent::new(
                &version.video_id,
                &version.language_code,
                EventKind::VisibilityChanged {
                    version_number,
                    visibility_override,
                },
            ))
            .await;

        Ok(version)
    }
}
