/*!
 * In-core pieces of the task workflow.
 *
 * The task state machine lives elsewhere; this module only keeps the task
 * ledger consistent when the engine purges a language.
 */

pub mod reconciler;

pub use reconciler::{ReconcileReport, TaskReconciler};
