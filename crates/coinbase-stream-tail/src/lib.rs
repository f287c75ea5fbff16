/*
[INPUT]:  Public API exports for coinbase-stream-tail crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod tail;

pub use crate::config::TailConfig;
pub use crate::tail::{TailSummary, build_client, run};
