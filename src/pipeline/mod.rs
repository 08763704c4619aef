//! Invoice ingestion pipeline.
//!
//! Each unseen message flows strictly downward:
//! 1. fetch raw bytes, decode (`crate::message`)
//! 2. `filter` — attachment extension allow-list
//! 3. `classify` — keyword match + qualifying attachment ⇒ invoice
//! 4. upload qualifying attachments (`crate::storage`)
//! 5. `transition` — copy to the processed folder, then mark deleted
//!
//! The orchestrator is the only component that sequences protocol calls,
//! and every message is processed inside an isolated failure boundary.

pub mod classify;
pub mod filter;
pub mod orchestrator;
pub mod transition;
pub mod types;

pub use orchestrator::Orchestrator;
