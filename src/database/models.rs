/*!
 * Database entity models.
 *
 * These structures map directly to database tables and provide
 * type-safe access to persisted data.
 */

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::subtitle_set::SubtitleSet;

/// Frozen provenance map: language code to the version used as a source
pub type Lineage = BTreeMap<String, i64>;

/// Format a timestamp the way every table stores it.
///
/// Fixed-width UTC with millisecond precision, so lexical order in SQL
/// matches chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in storage format
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a stored timestamp
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Version visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible to everybody
    Public,
    /// Visible to the team only
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            _ => Err(anyhow::anyhow!("Invalid visibility: {}", s)),
        }
    }
}

/// Filter applied when resolving the tip of a language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipMode {
    /// Latest version regardless of visibility
    Full,
    /// Latest version whose effective visibility is public
    Public,
}

impl fmt::Display for TipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TipMode::Full => write!(f, "full"),
            TipMode::Public => write!(f, "public"),
        }
    }
}

/// Registered video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// External immutable identifier
    pub video_id: String,
    /// Primary audio language, informational only
    pub primary_audio_language_code: Option<String>,
    /// Registration timestamp
    pub created_at: String,
}

/// Active writelock held on a language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteLock {
    /// User holding the lock
    pub owner: String,
    /// Editing session holding the lock
    pub session_key: String,
    /// When the lock was acquired or last renewed
    pub acquired_at: DateTime<Utc>,
}

impl WriteLock {
    /// Whether the lock has outlived its TTL at `now`
    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.acquired_at + ttl <= now
    }
}

/// Subtitle language row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleLanguage {
    pub video_id: String,
    pub language_code: String,
    /// Set once by the fork manager, never cleared
    pub is_forked: bool,
    pub subtitles_complete: bool,
    /// Languages whose lineage entries are dropped after a fork
    pub severed_sources: Vec<String>,
    pub writelock: Option<WriteLock>,
    pub created: String,
}

/// Identifies the state of a language's tips in storage.
///
/// Language row ids are never reused and the generation is bumped by every
/// commit that changes a tip, so equal stamps mean equal tips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TipStamp {
    pub language_id: i64,
    pub generation: i64,
}

/// Immutable subtitle version record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleVersion {
    pub video_id: String,
    pub language_code: String,
    /// 1-based, gapless per language
    pub version_number: i64,
    pub author: String,
    pub created: String,
    /// Workflow-derived visibility
    pub visibility: Visibility,
    /// Manual override, takes precedence when present
    pub visibility_override: Option<Visibility>,
    pub content: SubtitleSet,
    /// SHA256 of the serialized content
    pub content_hash: String,
    /// Frozen at creation
    pub lineage: Lineage,
    /// Version whose content this one restores
    pub rollback_of: Option<i64>,
    pub title: String,
    pub description: String,
    pub subtitle_count: i64,
}

impl SubtitleVersion {
    /// Visibility after applying the override
    pub fn effective_visibility(&self) -> Visibility {
        self.visibility_override.unwrap_or(self.visibility)
    }

    /// Whether the version is visible to the public
    pub fn is_public(&self) -> bool {
        self.effective_visibility() == Visibility::Public
    }

    /// Whether the version has no cues
    pub fn has_no_cues(&self) -> bool {
        self.content.is_empty()
    }

    /// Whether this version matches a tip filter
    pub fn matches(&self, mode: TipMode) -> bool {
        match mode {
            TipMode::Full => true,
            TipMode::Public => self.is_public(),
        }
    }
}

/// Workflow task types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Transcribe the original language
    Subtitle,
    /// Translate into another language
    Translate,
    /// Review a finished version
    Review,
    /// Approve a reviewed version
    Approve,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Subtitle => write!(f, "subtitle"),
            TaskType::Translate => write!(f, "translate"),
            TaskType::Review => write!(f, "review"),
            TaskType::Approve => write!(f, "approve"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "subtitle" => Ok(TaskType::Subtitle),
            "translate" => Ok(TaskType::Translate),
            "review" => Ok(TaskType::Review),
            "approve" => Ok(TaskType::Approve),
            _ => Err(anyhow::anyhow!("Invalid task type: {}", s)),
        }
    }
}

/// Workflow task row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Database ID
    pub id: i64,
    pub video_id: String,
    /// Language the task produces or checks
    pub language_code: String,
    pub task_type: TaskType,
    pub assignee: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
}

impl TaskRecord {
    /// Create a new unassigned task (without database ID)
    pub fn new(video_id: String, language_code: String, task_type: TaskType) -> Self {
        Self {
            id: 0, // Will be assigned by database
            video_id,
            language_code,
            task_type,
            assignee: None,
            started_at: None,
            completed_at: None,
            created_at: now_timestamp(),
        }
    }

    /// Assign the task to a user
    pub fn assigned_to(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Mark work as started
    pub fn started(mut self) -> Self {
        self.started_at = Some(now_timestamp());
        self
    }

    /// Someone has picked the task up or work has begun
    pub fn has_progress(&self) -> bool {
        self.assignee.is_some() || self.started_at.is_some() || self.completed_at.is_some()
    }
}
