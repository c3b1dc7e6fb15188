/*!
 * Translation lineage.
 *
 * A version's lineage maps each source language to the highest version of
 * it that the content was derived from, directly or transitively. It is
 * computed once from the caller's source refs, or carried over from the
 * previous version when an edit names none, and frozen on the version.
 */

use log::debug;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::database::models::{Lineage, TipMode};
use crate::database::Repository;
use crate::errors::{EngineError, EngineResult};
use crate::language_utils::normalize_language_code;

/// A (language, version) pair a new version was derived from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub language_code: String,
    pub version_number: i64,
}

impl SourceRef {
    pub fn new(language_code: impl Into<String>, version_number: i64) -> Self {
        Self {
            language_code: language_code.into(),
            version_number,
        }
    }

    /// Same ref with its language code normalized
    pub fn normalized(&self) -> EngineResult<Self> {
        Ok(Self {
            language_code: normalize_language_code(&self.language_code)?,
            version_number: self.version_number,
        })
    }
}

impl From<(&str, i64)> for SourceRef {
    fn from((language_code, version_number): (&str, i64)) -> Self {
        Self::new(language_code, version_number)
    }
}

/// Merge `other` into `into`, keeping the higher version per language
pub fn merge_max(into: &mut Lineage, other: &Lineage) {
    for (language, &version) in other {
        into.entry(language.clone())
            .and_modify(|current| *current = (*current).max(version))
            .or_insert(version);
    }
}

/// Keep the entries of an existing lineage that `target_language` may still
/// carry: its own language and `severed` languages are dropped.
///
/// Used for edits without source refs and for rollbacks, whose sources are
/// already frozen and need not exist anymore.
pub fn inherit_lineage(previous: &Lineage, target_language: &str, severed: &[String]) -> Lineage {
    previous
        .iter()
        .filter(|(language, _)| language.as_str() != target_language && !severed.contains(*language))
        .map(|(language, &version)| (language.clone(), version))
        .collect()
}

/// Compute the lineage for a version of `target_language`.
///
/// Refs to the target language itself and to `severed` languages are
/// skipped, and entries for either are stripped from inherited lineage.
/// Every remaining ref must name an existing version.
pub fn compute_lineage_sync(
    conn: &Connection,
    video_id: &str,
    target_language: &str,
    source_refs: &[SourceRef],
    severed: &[String],
) -> anyhow::Result<Lineage> {
    let excluded = |language: &str| language == target_language || severed.iter().any(|s| s == language);

    let mut lineage = Lineage::new();

    for source in source_refs {
        if excluded(&source.language_code) {
            debug!(
                "Skipping source {}#{} for {}/{}",
                source.language_code, source.version_number, video_id, target_language
            );
            continue;
        }

        let version = Repository::get_version_sync(
            conn,
            video_id,
            &source.language_code,
            source.version_number,
        )?
        .ok_or_else(|| {
            EngineError::version_not_found(video_id, &source.language_code, source.version_number)
        })?;

        merge_max(
            &mut lineage,
            &Lineage::from([(source.language_code.clone(), source.version_number)]),
        );
        merge_max(&mut lineage, &version.lineage);
    }

    lineage.retain(|language, _| !excluded(language));
    Ok(lineage)
}

/// How far one recorded source has fallen behind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageStatus {
    pub source_language: String,
    /// Version recorded in the language's current tip
    pub recorded_version: i64,
    /// Source language's current full tip, if it still exists
    pub source_tip: Option<i64>,
    pub is_stale: bool,
}

/// Read-side lineage queries
#[derive(Clone)]
pub struct LineageTracker {
    repo: Repository,
}

impl LineageTracker {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Lineage the given refs would produce for a new version, honoring fork
    /// state. Without refs the current tip's lineage is carried over.
    pub async fn compute_lineage(
        &self,
        video_id: &str,
        language_code: &str,
        source_refs: &[SourceRef],
    ) -> EngineResult<Lineage> {
        let language_code = normalize_language_code(language_code)?;
        let source_refs = source_refs
            .iter()
            .map(SourceRef::normalized)
            .collect::<EngineResult<Vec<_>>>()?;
        let video_id = video_id.to_string();

        let lineage = self
            .repo
            .db()
            .execute_async(move |conn| {
                let severed = Repository::get_language_sync(conn, &video_id, &language_code)?
                    .map(|language| language.severed_sources)
                    .unwrap_or_default();
                if source_refs.is_empty() {
                    let previous = Repository::get_tip_sync(conn, &video_id, &language_code, TipMode::Full)?
                        .map(|tip| tip.lineage)
                        .unwrap_or_default();
                    return Ok(inherit_lineage(&previous, &language_code, &severed));
                }
                compute_lineage_sync(conn, &video_id, &language_code, &source_refs, &severed)
            })
            .await?;

        Ok(lineage)
    }

    /// Frozen lineage of a stored version
    pub async fn get_lineage(
        &self,
        video_id: &str,
        language_code: &str,
        version_number: i64,
    ) -> EngineResult<Lineage> {
        let language_code = normalize_language_code(language_code)?;

        self.repo
            .get_version(video_id, &language_code, version_number)
            .await?
            .map(|version| version.lineage)
            .ok_or_else(|| EngineError::version_not_found(video_id, &language_code, version_number))
    }

    /// Compare the tip's recorded sources with their current tips.
    ///
    /// Severed sources of a forked language are left out.
    pub async fn staleness(&self, video_id: &str, language_code: &str) -> EngineResult<Vec<LineageStatus>> {
        let language_code = normalize_language_code(language_code)?;
        let video_id = video_id.to_string();

        let statuses = self
            .repo
            .db()
            .execute_async(move |conn| {
                let language = Repository::get_language_sync(conn, &video_id, &language_code)?
                    .ok_or_else(|| EngineError::language_not_found(&video_id, &language_code))?;

                let Some(tip) = Repository::get_tip_sync(conn, &video_id, &language_code, TipMode::Full)? else {
                    return Ok(Vec::new());
                };

                let mut statuses = Vec::new();
                for (source_language, &recorded_version) in &tip.lineage {
                    if language.severed_sources.contains(source_language) {
                        continue;
                    }
                    let source_tip = Repository::max_version_number_sync(conn, &video_id, source_language)?;
                    statuses.push(LineageStatus {
                        source_language: source_language.clone(),
                        recorded_version,
                        source_tip,
                        is_stale: source_tip.is_some_and(|tip| tip > recorded_version),
                    });
                }
                Ok(statuses)
            })
            .await?;

        Ok(statuses)
    }
}
