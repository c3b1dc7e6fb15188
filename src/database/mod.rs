/*!
 * Database module for persistent storage of the version ledger.
 *
 * This module provides SQLite-based persistence for:
 * - Videos and their subtitle languages (with writelock state)
 * - Immutable subtitle versions with frozen lineage
 * - Workflow tasks reconciled on language deletion
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::{DatabaseConnection, DatabaseStats};
pub use repository::Repository;
