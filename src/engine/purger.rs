/*!
 * Bulk deletion of a language.
 */

use log::info;
use serde::Serialize;

use super::events::{EngineEvent, EventDispatcher, EventKind};
use super::tip_resolver::TipResolver;
use crate::database::Repository;
use crate::errors::{EngineError, EngineResult};
use crate::language_utils::normalize_language_code;

/// What a purge removed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurgeReport {
    pub video_id: String,
    pub language_code: String,
    pub deleted_versions: usize,
}

/// Deletes a language with all of its versions in one transaction.
///
/// Languages forked from the purged one keep their rows and versions;
/// task cleanup is left to whoever listens for `language.deleted`.
#[derive(Clone)]
pub struct LanguagePurger {
    repo: Repository,
    tips: TipResolver,
    events: EventDispatcher,
}

impl LanguagePurger {
    pub fn new(repo: Repository, tips: TipResolver, events: EventDispatcher) -> Self {
        Self { repo, tips, events }
    }

    pub async fn nuke_language(&self, video_id: &str, language_code: &str) -> EngineResult<PurgeReport> {
        let language_code = normalize_language_code(language_code)?;
        let video = video_id.to_string();
        let language = language_code.clone();

        let deleted_versions = self
            .repo
            .db()
            .transaction_async(move |tx| {
                if Repository::get_language_sync(tx, &video, &language)?.is_none() {
                    return Err(EngineError::language_not_found(&video, &language).into());
                }

                Repository::delete_language_sync(tx, &video, &language)
            })
            .await?;

        self.tips.forget(video_id, &language_code);

        info!(
            "Purged {}/{} ({} version(s) deleted)",
            video_id, language_code, deleted_versions
        );

        self.events
            .dispatch(EngineEvent::new(
                video_id,
                &language_code,
                EventKind::LanguageDeleted { deleted_versions },
            ))
            .await;

        Ok(PurgeReport {
            video_id: video_id.to_string(),
            language_code,
            deleted_versions,
        })
    }
}
