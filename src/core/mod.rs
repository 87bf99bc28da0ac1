//! # Core Module
//!
//! The UI-agnostic deduplication engine.
//!
//! ## Modules
//! - `fingerprint` - Content fingerprints from photo/video metadata
//! - `filename` - Timestamp recovery from camera/messenger filenames
//! - `device` - Physical container identity across remounts
//! - `store` - SQLite persistence for files, sessions and tasks
//! - `scan` - Resumable directory scanning
//! - `plan` - Duplicate grouping into remediation tasks
//! - `exec` - Transactional task execution
//! - `report` - Library-wide summary statistics

pub mod device;
pub mod exec;
pub mod filename;
pub mod fingerprint;
pub mod plan;
pub mod report;
pub mod scan;
pub mod store;

// Re-export commonly used types
pub use device::{ContainerIdentity, ContainerResolver, DeviceInfo};
pub use exec::{ExecReport, TaskExecutor};
pub use fingerprint::{Fingerprint, MediaType};
pub use plan::PlanSummary;
pub use report::SummaryReport;
pub use scan::{ScanEngine, ScanOutcome, ScanTarget};
pub use store::{Store, TaskOperation};
