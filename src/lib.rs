//! # Media Deduplicator
//!
//! A crash-safe photo and video deduplicator for libraries spread across
//! removable drives.
//!
//! ## Core Philosophy
//! - **Survive interruption** - Every batch commits atomically; a scan or
//!   dedup run can be killed and resumed without losing work
//! - **Follow the drive, not the path** - Containers are identified by
//!   partition and disk ids, so a drive is recognized wherever it mounts
//! - **Plan before touching files** - Scanning, planning and executing
//!   are separate steps the user drives explicitly
//!
//! ## Architecture
//! The library is split into a core engine (UI-agnostic) and presentation
//! layers:
//! - `core` - Scanning, fingerprinting, planning and task execution
//! - `events` - Event-driven progress reporting (GUI-ready)
//! - `error` - User-friendly error types
//! - `cli` - Command-line interface

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{MediaDedupError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point (CLI or GUI).
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
