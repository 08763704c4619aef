//! Invoice ingest — mailbox-scanning invoice ingestion pipeline.
//!
//! Scans an IMAP inbox for unread messages that look like invoices,
//! uploads qualifying attachments to remote object storage, then archives
//! each handled message into a processed folder and deletes it from the
//! inbox. Archival is at-least-once: a message is never lost on the
//! source side, but may be re-processed after a partial failure.

pub mod config;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod pipeline;
pub mod storage;
