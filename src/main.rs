// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{debug, info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use subledger::app_config::{Config, LogLevel};
use subledger::database::models::{TipMode, Visibility};
use subledger::engine::{NewVersion, SourceRef, SubtitleEngine, WriteLease};
use subledger::subtitle_set::SubtitleSet;
use subledger::workflow::TaskReconciler;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// Visibility override accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliVisibility {
    Public,
    Private,
    /// Clear the override
    None,
}

impl From<CliVisibility> for Option<Visibility> {
    fn from(cli_visibility: CliVisibility) -> Self {
        match cli_visibility {
            CliVisibility::Public => Some(Visibility::Public),
            CliVisibility::Private => Some(Visibility::Private),
            CliVisibility::None => None,
        }
    }
}

/// Parse `LANG:VERSION` into a source ref
fn parse_source_ref(raw: &str) -> Result<SourceRef, String> {
    let (language, version) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected LANG:VERSION, got '{}'", raw))?;
    let version = version
        .parse::<i64>()
        .map_err(|_| format!("invalid version number in '{}'", raw))?;
    Ok(SourceRef::new(language, version))
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a video so languages can be written for it
    RegisterVideo {
        video_id: String,
        /// Primary audio language code
        #[arg(short, long)]
        primary_language: Option<String>,
    },

    /// Append a version from a JSON cue file
    Add {
        video_id: String,
        language_code: String,
        /// Author of the edit
        #[arg(short, long)]
        author: String,
        /// JSON array of cues; omit to submit an empty set
        #[arg(short, long, value_name = "CUES_JSON")]
        input: Option<PathBuf>,
        /// Source version this edit was translated from, as LANG:VERSION
        #[arg(long = "from", value_parser = parse_source_ref)]
        sources: Vec<SourceRef>,
        /// Store the version as private
        #[arg(long)]
        private: bool,
        /// Set the language's completeness flag
        #[arg(long)]
        complete: Option<bool>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Editing session holding the writelock
        #[arg(long)]
        session: Option<String>,
    },

    /// Show the current version of a language
    Tip {
        video_id: String,
        language_code: String,
        /// Only consider publicly visible versions
        #[arg(long)]
        public: bool,
    },

    /// List every version of a language
    History { video_id: String, language_code: String },

    /// Show the frozen lineage of a version
    Lineage {
        video_id: String,
        language_code: String,
        version: i64,
    },

    /// Compare recorded sources with their current tips
    Staleness { video_id: String, language_code: String },

    /// Sever a translation from its sources
    Fork { video_id: String, language_code: String },

    /// Append a copy of an older version
    Rollback {
        video_id: String,
        language_code: String,
        version: i64,
        #[arg(short, long)]
        author: String,
        #[arg(long)]
        session: Option<String>,
    },

    /// Delete a language with all of its versions
    Nuke { video_id: String, language_code: String },

    /// Set or clear a version's visibility override
    SetVisibility {
        video_id: String,
        language_code: String,
        version: i64,
        #[arg(value_enum)]
        visibility: CliVisibility,
    },

    /// Take or renew the writelock of a language
    Lock {
        video_id: String,
        language_code: String,
        #[arg(short, long)]
        owner: String,
        #[arg(short, long)]
        session: String,
    },

    /// Release a writelock held by a session
    Unlock {
        video_id: String,
        language_code: String,
        #[arg(short, long)]
        session: String,
    },

    /// Print database statistics
    Stats,

    /// Generate shell completions for subledger
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// subledger - subtitle version and lineage ledger
///
/// Keeps the append-only history of subtitle edits per video and language.
#[derive(Parser, Debug)]
#[command(name = "subledger")]
#[command(version)]
#[command(about = "Append-only subtitle version and lineage ledger")]
#[command(long_about = "subledger records every subtitle edit as an immutable version and tracks
which source versions each translation was made from.

EXAMPLES:
    subledger register-video vid42 -p en
    subledger add vid42 en -a ann -i en.json --complete true
    subledger add vid42 fr -a bob -i fr.json --from en:1
    subledger tip vid42 fr --public
    subledger staleness vid42 fr
    subledger rollback vid42 en 1 -a ann
    subledger completions bash > subledger.bash

CONFIGURATION:
    Configuration is stored in subledger.json by default. If the file does not
    exist a default one is created.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "subledger.json")]
    config_path: PathBuf,

    /// Database file, overrides the configuration
    #[arg(short, long, env = "SUBLEDGER_DB")]
    database: Option<PathBuf>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color and tag for a level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "ERROR"),
            Level::Warn => ("\x1B[1;33m", "WARN "),
            Level::Info => ("\x1B[1;32m", "INFO "),
            Level::Debug => ("\x1B[1;36m", "DEBUG"),
            Level::Trace => ("\x1B[1;35m", "TRACE"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (color, tag) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{}{} {} {}\x1B[0m", color, now, tag, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Print a value as pretty JSON on stdout
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // The logger starts at trace so the configured level can be applied later
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "subledger", &mut std::io::stdout());
        return Ok(());
    }

    if let Some(level) = &cli.log_level {
        log::set_max_level(LogLevel::from(level.clone()).to_level_filter());
    }

    let mut config = Config::load_or_create(&cli.config_path)?;
    if let Some(database) = &cli.database {
        config.database.path = Some(database.clone());
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone().into();
    }
    config.validate().context("Configuration validation failed")?;
    log::set_max_level(config.log_level.to_level_filter());

    let engine = SubtitleEngine::open(&config)?;
    engine.subscribe(Arc::new(TaskReconciler::new(engine.repository().clone())));
    debug!("Engine ready, tip cache {}", if config.engine.tip_cache_enabled { "on" } else { "off" });

    run_command(&engine, cli.command).await
}

async fn run_command(engine: &SubtitleEngine, command: Commands) -> Result<()> {
    match command {
        Commands::RegisterVideo {
            video_id,
            primary_language,
        } => {
            let video = engine
                .register_video(&video_id, primary_language.as_deref())
                .await?;
            print_json(&video)
        }
        Commands::Add {
            video_id,
            language_code,
            author,
            input,
            sources,
            private,
            complete,
            title,
            description,
            session,
        } => {
            let subtitles = match &input {
                Some(path) => {
                    let json = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read cue file: {}", path.display()))?;
                    SubtitleSet::from_json(&json)
                        .with_context(|| format!("Failed to parse cue file: {}", path.display()))?
                }
                None => SubtitleSet::new(),
            };

            let mut request = NewVersion::new(&video_id, &language_code, subtitles, &author)
                .with_source_refs(sources)
                .with_visibility(if private { Visibility::Private } else { Visibility::Public });
            if let Some(complete) = complete {
                request = request.complete(complete);
            }
            if let Some(title) = title {
                request = request.with_title(title);
            }
            if let Some(description) = description {
                request = request.with_description(description);
            }
            if let Some(session) = session {
                request = request.with_session(session);
            }

            match engine.create_version(request).await? {
                Some(version) => print_json(&version),
                None => {
                    info!("Nothing to record for {}/{}", video_id, language_code);
                    Ok(())
                }
            }
        }
        Commands::Tip {
            video_id,
            language_code,
            public,
        } => {
            let mode = if public { TipMode::Public } else { TipMode::Full };
            match engine.get_tip(&video_id, &language_code, mode).await? {
                Some(tip) => print_json(&tip),
                None => {
                    info!("{}/{} has no {} tip", video_id, language_code, mode);
                    Ok(())
                }
            }
        }
        Commands::History {
            video_id,
            language_code,
        } => {
            for version in engine.list_versions(&video_id, &language_code).await? {
                println!(
                    "v{:<4} {:<8} {:<24} {:>5} cues  {}{}",
                    version.version_number,
                    version.effective_visibility().to_string(),
                    version.created,
                    version.subtitle_count,
                    version.author,
                    version
                        .rollback_of
                        .map(|n| format!(" (rollback of v{})", n))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
        Commands::Lineage {
            video_id,
            language_code,
            version,
        } => print_json(&engine.get_lineage(&video_id, &language_code, version).await?),
        Commands::Staleness {
            video_id,
            language_code,
        } => print_json(&engine.staleness(&video_id, &language_code).await?),
        Commands::Fork {
            video_id,
            language_code,
        } => print_json(&engine.fork(&video_id, &language_code).await?),
        Commands::Rollback {
            video_id,
            language_code,
            version,
            author,
            session,
        } => {
            let restored = match session {
                Some(session) => {
                    engine
                        .rollback_in_session(&video_id, &language_code, version, &author, &session)
                        .await?
                }
                None => engine.rollback(&video_id, &language_code, version, &author).await?,
            };
            print_json(&restored)
        }
        Commands::Nuke {
            video_id,
            language_code,
        } => print_json(&engine.nuke_language(&video_id, &language_code).await?),
        Commands::SetVisibility {
            video_id,
            language_code,
            version,
            visibility,
        } => {
            let updated = engine
                .set_visibility_override(&video_id, &language_code, version, visibility.into())
                .await?;
            print_json(&updated)
        }
        Commands::Lock {
            video_id,
            language_code,
            owner,
            session,
        } => {
            let lease = engine
                .acquire_writelock(&video_id, &language_code, &owner, &session)
                .await?;
            println!(
                "Locked {}/{} for {} until {}",
                lease.video_id,
                lease.language_code,
                lease.owner,
                lease.expires_at(engine.writelock_ttl())
            );
            Ok(())
        }
        Commands::Unlock {
            video_id,
            language_code,
            session,
        } => {
            let language = engine.language(&video_id, &language_code).await?;
            let lease = WriteLease {
                video_id,
                language_code: language.language_code,
                owner: language.writelock.map(|lock| lock.owner).unwrap_or_default(),
                session_key: session,
                acquired_at: chrono::Utc::now(),
            };
            if engine.release_writelock(&lease).await? {
                println!("Released {}/{}", lease.video_id, lease.language_code);
                Ok(())
            } else {
                Err(anyhow!(
                    "Session {} does not hold the writelock on {}/{}",
                    lease.session_key,
                    lease.video_id,
                    lease.language_code
                ))
            }
        }
        Commands::Stats => {
            let stats = engine.repository().db().stats()?;
            let (hits, misses, hit_rate) = engine.tip_cache_stats();
            println!("{}", stats);
            println!(
                "Database: {}",
                engine.repository().db().path().display()
            );
            debug!("Tip cache: {} hits, {} misses ({:.0}%)", hits, misses, hit_rate * 100.0);
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

