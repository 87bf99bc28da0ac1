//! # Events Module
//!
//! Event-driven progress reporting.
//!
//! ## Design
//! The core library emits events through channels, allowing any UI
//! (CLI, GUI) to subscribe and display progress. The engines never
//! print or prompt; the CLI owns all console interaction.

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
