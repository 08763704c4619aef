//! Per-message archival state machine.
//!
//! `Unseen → Classified → Left` for non-invoices, or
//! `Unseen → Classified → Uploading → Uploaded → CopiedToProcessed →
//! MarkedDeleted` for invoices. Copy-then-delete is two independent
//! round-trips and the ordering is never relaxed: a message duplicated into
//! the processed folder but not yet deleted is a safe intermediate state,
//! the reverse would lose data. On any failure the machine lands in
//! `Failed` with the inbox flags untouched, so the next run's unseen
//! search retries the message.

use tracing::debug;

use crate::error::TransitionError;
use crate::mailbox::MailboxClient;
use crate::pipeline::types::MessageState;

/// Archival state for one message.
#[derive(Debug)]
pub struct ArchivalTransition {
    seq: u32,
    state: MessageState,
}

impl ArchivalTransition {
    pub fn new(seq: u32) -> Self {
        Self {
            seq,
            state: MessageState::Unseen,
        }
    }

    pub fn state(&self) -> MessageState {
        self.state
    }

    /// Classification finished (either verdict).
    pub fn classified(&mut self) {
        self.state = MessageState::Classified;
    }

    /// Not an invoice: leave the message unread in the inbox. Terminal.
    pub fn leave(&mut self) {
        self.state = MessageState::Left;
    }

    pub fn begin_upload(&mut self) {
        self.state = MessageState::Uploading;
    }

    /// Every qualifying attachment reported upload success.
    pub fn uploaded(&mut self) {
        self.state = MessageState::Uploaded;
    }

    /// Record a failure. Terminal; idempotent.
    pub fn fail(&mut self) {
        self.state = MessageState::Failed;
    }

    /// Archive the message: copy into `processed_folder`, then mark it
    /// deleted in the inbox. Expunge is not run here; it is a folder-wide
    /// compaction done once after the whole batch.
    pub fn archive(
        &mut self,
        mailbox: &mut dyn MailboxClient,
        processed_folder: &str,
    ) -> Result<(), TransitionError> {
        if let Err(source) = mailbox.copy_to(self.seq, processed_folder) {
            self.state = MessageState::Failed;
            return Err(TransitionError::Copy {
                folder: processed_folder.to_string(),
                source,
            });
        }
        self.state = MessageState::CopiedToProcessed;
        debug!(seq = self.seq, folder = %processed_folder, "Copied to processed folder");

        if let Err(source) = mailbox.mark_deleted(self.seq) {
            // Copy already succeeded: the duplicate in the processed folder
            // is the accepted intermediate state. The inbox copy stays
            // unseen and is re-processed next run.
            self.state = MessageState::Failed;
            return Err(TransitionError::MarkDeleted { source });
        }
        self.state = MessageState::MarkedDeleted;
        debug!(seq = self.seq, "Marked deleted in inbox");

        Ok(())
    }
}
