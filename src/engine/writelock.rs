/*!
 * Writelock leases.
 *
 * A lease grants one editing session exclusive write access to a
 * (video, language) pair until it is released or its TTL runs out.
 * Acquisition is a single compare-and-set UPDATE; there is no separate
 * read-then-write step.
 */

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rusqlite::Connection;

use crate::database::models::{format_timestamp, SubtitleLanguage};
use crate::database::Repository;
use crate::errors::{EngineError, EngineResult};
use crate::language_utils::normalize_language_code;

/// Proof that a session held the writelock at `acquired_at`
#[derive(Debug, Clone, PartialEq)]
pub struct WriteLease {
    pub video_id: String,
    pub language_code: String,
    pub owner: String,
    pub session_key: String,
    pub acquired_at: DateTime<Utc>,
}

impl WriteLease {
    /// When the lease stops protecting the language
    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        self.acquired_at + ttl
    }
}

/// Decide whether a write may proceed under the language's lock state.
///
/// Another session's unexpired lock always blocks. With `require_lease`
/// the caller must also hold an unexpired lock itself.
pub fn check_write_access(
    language: &SubtitleLanguage,
    session_key: Option<&str>,
    require_lease: bool,
    ttl: Duration,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    let active = language
        .writelock
        .as_ref()
        .filter(|lock| !lock.is_expired(ttl, now));

    let conflict = |owner: &str| EngineError::LockConflict {
        video_id: language.video_id.clone(),
        language_code: language.language_code.clone(),
        owner: owner.to_string(),
    };

    match active {
        Some(lock) if Some(lock.session_key.as_str()) != session_key => Err(conflict(&lock.owner)),
        Some(_) => Ok(()),
        None if require_lease => Err(conflict("nobody")),
        None => Ok(()),
    }
}

/// Lease manager over the language rows
#[derive(Clone)]
pub struct WriteLocks {
    repo: Repository,
    ttl: Duration,
}

impl WriteLocks {
    pub fn new(repo: Repository, ttl: Duration) -> Self {
        Self { repo, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Take the writelock, creating the language row if needed.
    ///
    /// Succeeds when the lock is free, expired, or already held by
    /// `session_key`; otherwise fails with `LockConflict`.
    pub async fn acquire(
        &self,
        video_id: &str,
        language_code: &str,
        owner: &str,
        session_key: &str,
    ) -> EngineResult<WriteLease> {
        let language_code = normalize_language_code(language_code)?;
        let video_id = video_id.to_string();
        let owner = owner.to_string();
        let session_key = session_key.to_string();
        let ttl = self.ttl;

        let lease = self
            .repo
            .db()
            .transaction_async(move |tx| {
                let now = Utc::now();

                if Repository::get_video_sync(tx, &video_id)?.is_none() {
                    return Err(EngineError::NotFound(format!("video {}", video_id)).into());
                }
                Repository::ensure_language_sync(tx, &video_id, &language_code, &format_timestamp(now))?;

                let acquired = Repository::try_acquire_writelock_sync(
                    tx,
                    &video_id,
                    &language_code,
                    &owner,
                    &session_key,
                    &format_timestamp(now),
                    &format_timestamp(now - ttl),
                )?;

                if acquired == 0 {
                    return Err(Self::conflict_sync(tx, &video_id, &language_code)?.into());
                }

                Ok(WriteLease {
                    video_id,
                    language_code,
                    owner,
                    session_key,
                    acquired_at: now,
                })
            })
            .await
            .map_err(EngineError::from);

        match &lease {
            Ok(lease) => info!(
                "Writelock on {}/{} acquired by {}",
                lease.video_id, lease.language_code, lease.owner
            ),
            Err(EngineError::LockConflict { video_id, language_code, owner }) => warn!(
                "Writelock on {}/{} refused: held by {}",
                video_id, language_code, owner
            ),
            Err(_) => {}
        }

        lease
    }

    /// Extend a lease still held by its session
    pub async fn renew(&self, lease: &WriteLease) -> EngineResult<WriteLease> {
        let lease = lease.clone();

        let renewed = self
            .repo
            .db()
            .transaction_async(move |tx| {
                let now = Utc::now();
                let updated = Repository::renew_writelock_sync(
                    tx,
                    &lease.video_id,
                    &lease.language_code,
                    &lease.session_key,
                    &format_timestamp(now),
                )?;

                if updated == 0 {
                    return Err(Self::conflict_sync(tx, &lease.video_id, &lease.language_code)?.into());
                }

                Ok(WriteLease {
                    acquired_at: now,
                    ..lease
                })
            })
            .await?;

        debug!(
            "Writelock on {}/{} renewed by {}",
            renewed.video_id, renewed.language_code, renewed.owner
        );
        Ok(renewed)
    }

    /// Give the lock up; returns false if the session no longer held it
    pub async fn release(&self, lease: &WriteLease) -> EngineResult<bool> {
        let lease = lease.clone();

        let released = self
            .repo
            .db()
            .transaction_async(move |tx| {
                Repository::release_writelock_sync(
                    tx,
                    &lease.video_id,
                    &lease.language_code,
                    &lease.session_key,
                )
            })
            .await?;

        Ok(released > 0)
    }

    /// Whether `session_key` could write to the language right now
    pub async fn can_write(
        &self,
        video_id: &str,
        language_code: &str,
        session_key: Option<&str>,
    ) -> EngineResult<bool> {
        let language_code = normalize_language_code(language_code)?;
        let language = self.repo.get_language(video_id, &language_code).await?;

        Ok(match language {
            Some(language) => check_write_access(&language, session_key, false, self.ttl, Utc::now()).is_ok(),
            None => true,
        })
    }

    /// Build the error explaining why the lock could not be taken
    fn conflict_sync(conn: &Connection, video_id: &str, language_code: &str) -> anyhow::Result<EngineError> {
        let language = Repository::get_language_sync(conn, video_id, language_code)?;

        Ok(match language {
            Some(language) => EngineError::LockConflict {
                video_id: video_id.to_string(),
                language_code: language_code.to_string(),
                owner: language
                    .writelock
                    .map(|lock| lock.owner)
                    .unwrap_or_else(|| "nobody".to_string()),
            },
            None => EngineError::language_not_found(video_id, language_code),
        })
    }
}
