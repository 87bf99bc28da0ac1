//! # media-dedup CLI
//!
//! Command-line interface for the media deduplicator.
//!
//! ## Usage
//! ```bash
//! media-dedup scan ~/Photos
//! media-dedup summary
//! media-dedup prepare
//! media-dedup deduplicate
//! ```

mod cli;

use media_deduplicator::Result;

fn main() -> Result<()> {
    cli::run()
}
