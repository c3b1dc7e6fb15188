/*!
 * # subledger - subtitle version and lineage ledger
 *
 * A Rust library keeping the append-only history of a video's subtitles
 * per language.
 *
 * ## Features
 *
 * - Immutable versions with gapless numbering per (video, language)
 * - Tip resolution under `full` and `public` visibility, cached and
 *   validated against a stamp every commit bumps
 * - Frozen translation lineage and staleness reports
 * - Forking a translation away from its sources
 * - Rollback by appending, never by rewriting
 * - Atomic purge of a language with task reconciliation
 * - TTL writelock leases with compare-and-set acquisition
 * - SQLite persistence
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `subtitle_set`: Cue sequences, validation and content hashing
 * - `database`: SQLite schema, connection and repository
 * - `engine`: The version engine:
 *   - `engine::version_store`: Version creation and visibility overrides
 *   - `engine::lineage`: Lineage computation and staleness
 *   - `engine::tip_resolver`: Cached tip lookups
 *   - `engine::fork`, `engine::rollback`, `engine::purger`
 *   - `engine::writelock`: Editing leases
 *   - `engine::events`: Post-commit notifications
 * - `workflow`: Task reconciliation on language deletion
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the library
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::too_many_arguments)]

// Public modules
pub mod app_config;
pub mod database;
pub mod engine;
pub mod errors;
pub mod language_utils;
pub mod subtitle_set;
pub mod workflow;

// Re-export main types for easier usage
pub use app_config::Config;
pub use database::models::{Lineage, SubtitleLanguage, SubtitleVersion, TipMode, Visibility};
pub use engine::{NewVersion, SourceRef, SubtitleEngine, WriteLease};
pub use errors::{EngineError, EngineResult};
pub use subtitle_set::{Cue, SubtitleSet};
pub use workflow::TaskReconciler;
