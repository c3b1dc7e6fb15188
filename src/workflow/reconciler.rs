/*!
 * Task cleanup after a language is purged.
 *
 * Rules applied on `language.deleted`:
 * - tasks of the purged language that nobody picked up are deleted;
 * - tasks with an assignee, a start or a completion are always kept;
 * - unstarted Translate tasks of other languages are deleted only when no
 *   language of the video has a public version left to translate from.
 */

use async_trait::async_trait;
use log::info;
use serde::Serialize;

use crate::database::models::{TaskRecord, TaskType};
use crate::database::Repository;
use crate::engine::events::{EngineEvent, EventKind, EventListener};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub deleted: Vec<i64>,
    pub preserved: Vec<i64>,
}

/// Listener keeping the task ledger consistent with purged languages
#[derive(Clone)]
pub struct TaskReconciler {
    repo: Repository,
}

impl TaskReconciler {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Apply the deletion rules for `language_code` of `video_id`
    pub async fn reconcile_deleted_language(
        &self,
        video_id: &str,
        language_code: &str,
    ) -> anyhow::Result<ReconcileReport> {
        let video_id = video_id.to_string();
        let language_code = language_code.to_string();

        let report = self
            .repo
            .db()
            .transaction_async(move |tx| {
                let tasks = Repository::list_tasks_sync(tx, &video_id)?;
                let source_available = !Repository::languages_with_public_tip_sync(tx, &video_id)?.is_empty();

                let mut report = ReconcileReport::default();
                for task in tasks.iter().filter(|task| affected(task, &language_code)) {
                    if task.has_progress() {
                        report.preserved.push(task.id);
                    } else if task.language_code == language_code || !source_available {
                        report.deleted.push(task.id);
                    }
                }

                Repository::delete_tasks_sync(tx, &report.deleted)?;
                Ok(report)
            })
            .await?;

        Ok(report)
    }
}

/// Tasks the purge of `language_code` can touch at all
fn affected(task: &TaskRecord, language_code: &str) -> bool {
    task.language_code == language_code || task.task_type == TaskType::Translate
}

#[async_trait]
impl EventListener for TaskReconciler {
    fn name(&self) -> &str {
        "task-reconciler"
    }

    async fn on_event(&self, event: &EngineEvent) -> anyhow::Result<()> {
        if let EventKind::LanguageDeleted { .. } = event.kind {
            let report = self
                .reconcile_deleted_language(&event.video_id, &event.language_code)
                .await?;
            info!(
                "Reconciled tasks for {}/{}: {} deleted, {} preserved",
                event.video_id,
                event.language_code,
                report.deleted.len(),
                report.preserved.len()
            );
        }
        Ok(())
    }
}
