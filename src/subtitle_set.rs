use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{EngineError, EngineResult};

// @module: Abstract cue sequence exchanged with the format codecs

// @struct: Single timed cue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    // @field: Start time in ms
    pub start_ms: i64,

    // @field: End time in ms
    pub end_ms: i64,

    // @field: Cue text
    pub text: String,

    // @field: Codec-specific metadata (speaker, new_paragraph, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Cue {
    /// Creates a cue without metadata
    pub fn new(start_ms: i64, end_ms: i64, text: impl Into<String>) -> Self {
        Cue {
            start_ms,
            end_ms,
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attaches a metadata key
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Duration of the cue in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Format a timestamp in milliseconds as HH:MM:SS,mmm
    pub fn format_timestamp(ms: i64) -> String {
        let ms = ms.max(0);
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "{} --> {}",
            Self::format_timestamp(self.start_ms),
            Self::format_timestamp(self.end_ms)
        )?;
        writeln!(f, "{}", self.text)
    }
}

/// Ordered cue sequence stored as the content of a version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtitleSet {
    cues: Vec<Cue>,
}

impl SubtitleSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set from already ordered cues
    pub fn from_cues(cues: Vec<Cue>) -> Self {
        Self { cues }
    }

    /// Append a cue
    pub fn push(&mut self, cue: Cue) {
        self.cues.push(cue);
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Check timings before anything is persisted.
    ///
    /// Start times must be non-negative and ascending, and no cue may end
    /// before it starts.
    pub fn validate(&self) -> EngineResult<()> {
        let mut previous_start: Option<i64> = None;

        for (index, cue) in self.cues.iter().enumerate() {
            let position = index + 1;

            if cue.start_ms < 0 || cue.end_ms < 0 {
                return Err(EngineError::InvalidSubtitleData(format!(
                    "cue {} has a negative timing ({} --> {})",
                    position, cue.start_ms, cue.end_ms
                )));
            }

            if cue.end_ms < cue.start_ms {
                return Err(EngineError::InvalidSubtitleData(format!(
                    "cue {} ends before it starts ({} --> {})",
                    position, cue.start_ms, cue.end_ms
                )));
            }

            if let Some(previous) = previous_start {
                if cue.start_ms < previous {
                    return Err(EngineError::InvalidSubtitleData(format!(
                        "cue {} starts at {} before the previous cue at {}",
                        position, cue.start_ms, previous
                    )));
                }
            }

            previous_start = Some(cue.start_ms);
        }

        Ok(())
    }

    /// Serialized form stored in the version row
    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string(self)
            .map_err(|e| EngineError::InvalidSubtitleData(format!("unserializable cues: {}", e)))
    }

    /// Parse the stored form back
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// SHA256 of the serialized form, hex encoded
    pub fn content_hash(&self) -> EngineResult<String> {
        let json = self.to_json()?;
        Ok(hash_content(&json))
    }
}

impl From<Vec<Cue>> for SubtitleSet {
    fn from(cues: Vec<Cue>) -> Self {
        Self::from_cues(cues)
    }
}

impl fmt::Display for SubtitleSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (index, cue) in self.cues.iter().enumerate() {
            writeln!(f, "{}", index + 1)?;
            write!(f, "{}", cue)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Hex SHA256 of serialized content
pub fn hash_content(serialized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    format!("{:x}", hasher.finalize())
}
