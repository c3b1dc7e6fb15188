/*!
 * Engine notifications.
 *
 * Every committed change is announced as an [`EngineEvent`] to the
 * listeners registered on an [`EventDispatcher`]. Dispatch happens after the
 * commit; a failing listener is logged and never undoes the write.
 */

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::database::models::Visibility;

/// What happened to the language
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A new version was appended
    VersionCreated {
        version_number: i64,
        author: String,
        rollback_of: Option<i64>,
    },
    /// The language and all its versions were purged
    LanguageDeleted { deleted_versions: usize },
    /// The language stopped following its translation sources
    LanguageForked { severed_sources: Vec<String> },
    /// A version's visibility override was set or cleared
    VisibilityChanged {
        version_number: i64,
        visibility_override: Option<Visibility>,
    },
}

/// A committed change on one subtitle language
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub video_id: String,
    pub language_code: String,
    pub kind: EventKind,
}

impl EngineEvent {
    pub fn new(video_id: impl Into<String>, language_code: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            video_id: video_id.into(),
            language_code: language_code.into(),
            kind,
        }
    }

    /// Dot-separated event name
    pub fn name(&self) -> &'static str {
        match self.kind {
            EventKind::VersionCreated { .. } => "version.created",
            EventKind::LanguageDeleted { .. } => "language.deleted",
            EventKind::LanguageForked { .. } => "language.forked",
            EventKind::VisibilityChanged { .. } => "version.visibility_changed",
        }
    }
}

/// Collaborator reacting to engine events
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Handle one event
    async fn on_event(&self, event: &EngineEvent) -> anyhow::Result<()>;
}

/// Fan-out of events to registered listeners
#[derive(Clone, Default)]
pub struct EventDispatcher {
    listeners: Arc<RwLock<Vec<Arc<dyn EventListener>>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for all subsequent events
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        debug!("Registered event listener '{}'", listener.name());
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver an event to every listener in registration order
    pub async fn dispatch(&self, event: EngineEvent) {
        // Snapshot so the lock is not held across awaits
        let listeners: Vec<Arc<dyn EventListener>> = self.listeners.read().clone();

        debug!(
            "Dispatching {} for {}/{} to {} listener(s)",
            event.name(),
            event.video_id,
            event.language_code,
            listeners.len()
        );

        for listener in listeners {
            if let Err(e) = listener.on_event(&event).await {
                error!(
                    "Listener '{}' failed on {} for {}/{}: {:#}",
                    listener.name(),
                    event.name(),
                    event.video_id,
                    event.language_code,
                    e
                );
            }
        }
    }
}
