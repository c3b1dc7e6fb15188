/*!
 * Rollback by appending.
 *
 * A rollback is an ordinary write whose content, title, description and
 * visibility come from an older version. The counter never rewinds and
 * the target is left untouched.
 */

use log::info;

use super::version_store::{CommitOutcome, NewVersion, PreparedWrite, VersionStore};
use crate::database::models::SubtitleVersion;
use crate::errors::{EngineError, EngineResult};
use crate::subtitle_set::SubtitleSet;

#[derive(Clone)]
pub struct RollbackEngine {
    store: VersionStore,
}

impl RollbackEngine {
    pub fn new(store: VersionStore) -> Self {
        Self { store }
    }

    /// Append a copy of `target_version` as the new tip
    pub async fn rollback(
        &self,
        video_id: &str,
        language_code: &str,
        target_version: i64,
        author: &str,
    ) -> EngineResult<SubtitleVersion> {
        self.rollback_in_session(video_id, language_code, target_version, author, None)
            .await
    }

    /// Rollback under an editing session's writelock
    pub async fn rollback_in_session(
        &self,
        video_id: &str,
        language_code: &str,
        target_version: i64,
        author: &str,
        session_key: Option<&str>,
    ) -> EngineResult<SubtitleVersion> {
        let mut request = NewVersion::new(video_id, language_code, SubtitleSet::new(), author);
        request.session_key = session_key.map(str::to_string);

        info!(
            "Rolling back {}/{} to version {} for {}",
            video_id, language_code, target_version, author
        );

        match self.store.append(PreparedWrite::rollback(request, target_version)?).await? {
            CommitOutcome::Created(version) => Ok(version),
            CommitOutcome::Unchanged(_) => Err(EngineError::Storage(format!(
                "rollback of {}/{} to {} did not append a version",
                video_id, language_code, target_version
            ))),
        }
    }
}
