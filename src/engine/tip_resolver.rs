/*!
 * Tip resolution with a commit-validated cache.
 *
 * The tip of a language is a filtered max over its immutable versions.
 * Results are memoized per (video, language) and mode together with the
 * language's [`TipStamp`]. Every commit that changes a tip bumps the stamp
 * in storage inside the same transaction, whichever connection or process
 * made it, and a cached tip is only served while the stored stamp still
 * matches. The stamp check and the load run under one hold of the
 * connection, so a reader never pairs a tip with a newer stamp.
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::database::models::{SubtitleVersion, TipMode, TipStamp};
use crate::database::Repository;
use crate::errors::{EngineError, EngineResult};
use crate::language_utils::normalize_language_code;

type LanguageKey = (String, String);

struct CacheSlot {
    stamp: TipStamp,
    full: Option<Option<SubtitleVersion>>,
    public: Option<Option<SubtitleVersion>>,
}

impl CacheSlot {
    fn new(stamp: TipStamp) -> Self {
        Self {
            stamp,
            full: None,
            public: None,
        }
    }

    fn get(&self, mode: TipMode) -> Option<&Option<SubtitleVersion>> {
        match mode {
            TipMode::Full => self.full.as_ref(),
            TipMode::Public => self.public.as_ref(),
        }
    }

    fn set(&mut self, mode: TipMode, tip: Option<SubtitleVersion>) {
        match mode {
            TipMode::Full => self.full = Some(tip),
            TipMode::Public => self.public = Some(tip),
        }
    }
}

/// Resolves and caches the current version of a language
#[derive(Clone)]
pub struct TipResolver {
    repo: Repository,
    slots: Arc<RwLock<HashMap<LanguageKey, CacheSlot>>>,
    hits: Arc<AtomicUsize>,
    misses: Arc<AtomicUsize>,
    enabled: bool,
}

impl TipResolver {
    pub fn new(repo: Repository, enabled: bool) -> Self {
        Self {
            repo,
            slots: Arc::new(RwLock::new(HashMap::new())),
            hits: Arc::new(AtomicUsize::new(0)),
            misses: Arc::new(AtomicUsize::new(0)),
            enabled,
        }
    }

    /// Current version of a language under `mode`.
    ///
    /// `Ok(None)` means the language exists but nothing matches the filter;
    /// a missing language is `NotFound`.
    pub async fn get_tip(
        &self,
        video_id: &str,
        language_code: &str,
        mode: TipMode,
    ) -> EngineResult<Option<SubtitleVersion>> {
        let language_code = normalize_language_code(language_code)?;
        let key = (video_id.to_string(), language_code.clone());
        let resolver = self.clone();

        let (tip, hit) = self
            .repo
            .db()
            .execute_async(move |conn| {
                let (video_id, language_code) = (&key.0, &key.1);

                let Some(stamp) = Repository::tip_stamp_sync(conn, video_id, language_code)? else {
                    resolver.forget(video_id, language_code);
                    return Err(EngineError::language_not_found(video_id, language_code).into());
                };

                if let Some(tip) = resolver.lookup(&key, mode, stamp) {
                    return Ok((tip, true));
                }

                let tip = Repository::get_tip_sync(conn, video_id, language_code, mode)?;
                resolver.store(key.clone(), mode, stamp, tip.clone());
                Ok((tip, false))
            })
            .await?;

        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Tip cache hit for {}/{} ({})", video_id, language_code, mode);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(tip)
    }

    /// Drop the cached tips of a language
    pub fn forget(&self, video_id: &str, language_code: &str) {
        let removed = self
            .slots
            .write()
            .remove(&(video_id.to_string(), language_code.to_string()));
        if removed.is_some() {
            debug!("Dropped cached tips of {}/{}", video_id, language_code);
        }
    }

    /// Cache statistics: hits, misses and hit rate
    pub fn stats(&self) -> (usize, usize, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        (hits, misses, hit_rate)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of languages with cached tips
    pub fn cached_languages(&self) -> usize {
        self.slots.read().len()
    }

    fn lookup(&self, key: &LanguageKey, mode: TipMode, stamp: TipStamp) -> Option<Option<SubtitleVersion>> {
        if !self.enabled {
            return None;
        }
        self.slots
            .read()
            .get(key)
            .filter(|slot| slot.stamp == stamp)
            .and_then(|slot| slot.get(mode).cloned())
    }

    fn store(&self, key: LanguageKey, mode: TipMode, stamp: TipStamp, tip: Option<SubtitleVersion>) {
        if !self.enabled {
            return;
        }
        let mut slots = self.slots.write();
        let slot = slots.entry(key).or_insert_with(|| CacheSlot::new(stamp));
        if slot.stamp != stamp {
            *slot = CacheSlot::new(stamp);
        }
        slot.set(mode, tip);
    }
}
