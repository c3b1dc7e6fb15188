/*!
 * Forking a translation into an independent language.
 */

use log::{debug, info};

use super::events::{EngineEvent, EventDispatcher, EventKind};
use crate::database::models::SubtitleLanguage;
use crate::database::Repository;
use crate::errors::{EngineError, EngineResult};
use crate::language_utils::normalize_language_code;

/// Severs a language from the sources it was translated from.
///
/// The severed set is every language named in the lineage of any version
/// of the language, so a source survives plain edits that came after the
/// translation. Later writes drop refs and inherited entries for them.
/// Stored versions are left as they are and the flag is never cleared.
#[derive(Clone)]
pub struct ForkManager {
    repo: Repository,
    events: EventDispatcher,
}

impl ForkManager {
    pub fn new(repo: Repository, events: EventDispatcher) -> Self {
        Self { repo, events }
    }

    /// Fork a language; forking an already forked language changes nothing
    pub async fn fork(&self, video_id: &str, language_code: &str) -> EngineResult<SubtitleLanguage> {
        let language_code = normalize_language_code(language_code)?;
        let video = video_id.to_string();

        let (language, newly_forked) = self
            .repo
            .db()
            .transaction_async(move |tx| {
                let language = Repository::get_language_sync(tx, &video, &language_code)?
                    .ok_or_else(|| EngineError::language_not_found(&video, &language_code))?;

                if language.is_forked {
                    return Ok((language, false));
                }

                let severed = Repository::lineage_languages_sync(tx, &video, &language_code)?;

                Repository::mark_forked_sync(tx, &video, &language_code, &severed)?;

                let language = Repository::get_language_sync(tx, &video, &language_code)?
                    .ok_or_else(|| EngineError::language_not_found(&video, &language_code))?;
                Ok((language, true))
            })
            .await?;

        if !newly_forked {
            debug!("{}/{} is already forked", video_id, language.language_code);
            return Ok(language);
        }

        info!(
            "Forked {}/{}, severed sources: [{}]",
            video_id,
            language.language_code,
            language.severed_sources.join(", ")
        );

        self.events
            .dispatch(EngineEvent::new(
                video_id,
                &language.language_code,
                EventKind::LanguageForked {
                    severed_sources: language.severed_sources.clone(),
                },
            ))
            .await;

        Ok(language)
    }
}
