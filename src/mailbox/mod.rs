//! Mailbox protocol session abstraction.
//!
//! One session per run, exclusively owned by the orchestrator, all
//! operations strictly sequential. The `imap` module holds the real
//! TLS session; tests substitute in-memory fakes behind [`MailboxClient`].

pub mod imap;

pub use imap::ImapSession;

use crate::error::ProtocolError;

/// Store-maintained message flags this pipeline touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Seen,
    Deleted,
}

impl Flag {
    /// Wire representation.
    pub fn imap(self) -> &'static str {
        match self {
            Self::Seen => "\\Seen",
            Self::Deleted => "\\Deleted",
        }
    }
}

/// Stateful mail-store session: folder management, search, fetch, flags,
/// copy, expunge. Connect/auth happen when the concrete session is built,
/// so a value of this type is always authenticated.
///
/// Message sequence ids are stable only within the session; every run must
/// take a fresh [`search_unseen`](MailboxClient::search_unseen) snapshot.
pub trait MailboxClient {
    /// Create `name` if it does not exist. Idempotent: succeeds whether or
    /// not the folder pre-exists.
    fn ensure_folder(&mut self, name: &str) -> Result<(), ProtocolError>;

    /// Select `name` as the current folder. Fails with
    /// [`ProtocolError::NotSelectable`] if it is absent.
    fn select_folder(&mut self, name: &str) -> Result<(), ProtocolError>;

    /// Sequence ids of unseen messages in the selected folder, ascending.
    fn search_unseen(&mut self) -> Result<Vec<u32>, ProtocolError>;

    /// Raw RFC822 bytes of a message, without touching its Unseen flag.
    /// Fails with [`ProtocolError::NotFound`] if the message vanished.
    fn fetch_raw(&mut self, seq: u32) -> Result<Vec<u8>, ProtocolError>;

    /// Add a flag to a message.
    fn set_flag(&mut self, seq: u32, flag: Flag) -> Result<(), ProtocolError>;

    /// Copy a message into another folder. Never moves or deletes.
    fn copy_to(&mut self, seq: u32, folder: &str) -> Result<(), ProtocolError>;

    /// Flag a message `\Deleted` (and `\Seen`, in the same round-trip, so
    /// the Unseen watermark is only ever lost at this final step).
    fn mark_deleted(&mut self, seq: u32) -> Result<(), ProtocolError>;

    /// Permanently remove everything flagged deleted in the selected
    /// folder. Folder-wide compaction, run once per batch.
    fn expunge_all(&mut self) -> Result<(), ProtocolError>;

    /// End the session. The session is unusable afterwards.
    fn logout(&mut self) -> Result<(), ProtocolError>;
}
