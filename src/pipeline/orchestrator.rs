//! Batch orchestrator — the only component that sequences protocol calls.
//!
//! One run: ensure the processed folder, select the inbox, snapshot the
//! unseen-message list, then drive each message through
//! parse → filter → classify → upload → archive inside an isolated failure
//! boundary. A bad message records a `Failed` outcome and the loop moves
//! on; only setup failures (connect/select) abort the batch. After the
//! loop a single bulk expunge compacts the inbox, and logout always runs,
//! even when the batch aborted.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{MessageError, ProtocolError};
use crate::mailbox::MailboxClient;
use crate::message;
use crate::pipeline::transition::ArchivalTransition;
use crate::pipeline::types::{OutcomeError, ProcessingOutcome, RunSummary};
use crate::pipeline::{classify, filter};
use crate::storage::UploadSink;

/// Drives one ingestion run over an exclusively owned mailbox session.
pub struct Orchestrator<'a> {
    config: &'a Config,
    sink: &'a dyn UploadSink,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a Config, sink: &'a dyn UploadSink) -> Self {
        Self { config, sink }
    }

    /// Run the batch. Logout is attempted unconditionally on exit, even
    /// when setup or expunge failed.
    pub fn run(&self, mailbox: &mut dyn MailboxClient) -> Result<RunSummary, ProtocolError> {
        let result = self.run_batch(mailbox);
        if let Err(e) = mailbox.logout() {
            warn!(error = %e, "Logout failed");
        }
        result
    }

    fn run_batch(&self, mailbox: &mut dyn MailboxClient) -> Result<RunSummary, ProtocolError> {
        mailbox.ensure_folder(&self.config.processed_folder)?;
        mailbox.select_folder(&self.config.inbox)?;

        // One snapshot per run; sequence ids are only stable within the
        // session, so there is no live re-query.
        let seqs = mailbox.search_unseen()?;
        info!(count = seqs.len(), inbox = %self.config.inbox, "Unseen messages found");

        let mut outcomes = Vec::with_capacity(seqs.len());
        for seq in seqs {
            let outcome = self.process_message(mailbox, seq);
            info!(
                seq,
                state = outcome.state.label(),
                uploads = outcome.uploads.len(),
                "Message settled"
            );
            outcomes.push(outcome);
        }

        // Folder-wide compaction, once per batch. Failure leaves deleted
        // messages flagged until the next run's expunge.
        if let Err(e) = mailbox.expunge_all() {
            warn!(error = %e, "Expunge failed");
        }

        let summary = RunSummary::from_outcomes(outcomes);
        info!(
            processed = summary.processed,
            left = summary.left,
            failed = summary.failed,
            "Batch complete"
        );
        Ok(summary)
    }

    /// Isolated failure boundary: nothing raised while processing one
    /// message escapes past this method.
    fn process_message(&self, mailbox: &mut dyn MailboxClient, seq: u32) -> ProcessingOutcome {
        let mut transition = ArchivalTransition::new(seq);
        let mut outcome = ProcessingOutcome {
            seq,
            subject: String::new(),
            state: transition.state(),
            uploads: Vec::new(),
            error: None,
        };

        if let Err(e) = self.process_inner(mailbox, seq, &mut transition, &mut outcome) {
            error!(
                seq,
                stage = e.stage(),
                error = %e,
                "Message failed; it stays unseen and is retried next run"
            );
            transition.fail();
            outcome.error = Some(OutcomeError::from(&e));
        }

        outcome.state = transition.state();
        outcome
    }

    fn process_inner(
        &self,
        mailbox: &mut dyn MailboxClient,
        seq: u32,
        transition: &mut ArchivalTransition,
        outcome: &mut ProcessingOutcome,
    ) -> Result<(), MessageError> {
        let raw = mailbox.fetch_raw(seq).map_err(|e| match e {
            ProtocolError::NotFound { seq } => MessageError::NotFound { seq },
            other => MessageError::Protocol {
                stage: "fetch",
                source: other,
            },
        })?;

        let msg = message::parse(&raw);
        outcome.subject = msg.subject.clone();

        let qualifying = filter::filter(msg.attachments, &self.config.allowed_extensions);
        let classification = classify::classify(
            &msg.subject,
            &msg.body,
            &self.config.keywords,
            qualifying.len(),
        );
        transition.classified();

        info!(
            seq,
            subject = %msg.subject,
            matched = ?classification.matched_terms,
            attachments = qualifying.len(),
            invoice = classification.is_invoice,
            "Message classified"
        );

        if !classification.is_invoice {
            transition.leave();
            return Ok(());
        }

        transition.begin_upload();
        for attachment in &qualifying {
            let remote_name = filter::rename(&attachment.filename, Utc::now().timestamp());
            let result = self
                .sink
                .upload(&attachment.bytes, &remote_name)
                .map_err(|source| MessageError::Upload {
                    filename: attachment.filename.clone(),
                    source,
                })?;
            info!(seq, remote_id = %result.remote_id, name = %result.remote_name, "Attachment uploaded");
            outcome.uploads.push(result);
        }
        transition.uploaded();

        transition.archive(mailbox, &self.config.processed_folder)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::{BTreeMap, BTreeSet};
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;
    use crate::error::UploadError;
    use crate::mailbox::Flag;
    use crate::pipeline::types::{MessageState, UploadResult};

    fn test_config() -> Config {
        Config {
            imap_host: "imap.test.example".into(),
            imap_port: 993,
            username: "ap@test.example".into(),
            password: SecretString::from("pw".to_string()),
            inbox: "INBOX".into(),
            processed_folder: "Processed".into(),
            storage_url: "https://storage.test.example/upload".into(),
            storage_folder: "folder-1".into(),
            storage_token: None,
            keywords: vec!["invoice".into(), "bill".into(), "payment".into()],
            allowed_extensions: vec!["pdf".into()],
            timeout: Duration::from_secs(30),
        }
    }

    /// Minimal RFC822 builder for fixtures.
    fn email(subject: &str, body: &str, attachments: &[(&str, &str)]) -> Vec<u8> {
        let mut raw = String::new();
        raw.push_str("From: sender@vendor.example\r\n");
        raw.push_str(&format!("Subject: {subject}\r\n"));
        raw.push_str("MIME-Version: 1.0\r\n");
        raw.push_str("Content-Type: multipart/mixed; boundary=\"b\"\r\n\r\n");
        raw.push_str("--b\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n");
        raw.push_str(body);
        raw.push_str("\r\n");
        for (name, contents) in attachments {
            raw.push_str("--b\r\n");
            raw.push_str("Content-Type: application/octet-stream\r\n");
            raw.push_str(&format!(
                "Content-Disposition: attachment; filename=\"{name}\"\r\n\r\n"
            ));
            raw.push_str(contents);
            raw.push_str("\r\n");
        }
        raw.push_str("--b--\r\n");
        raw.into_bytes()
    }

    #[derive(Default)]
    struct FakeMailbox {
        messages: BTreeMap<u32, Vec<u8>>,
        vanished: BTreeSet<u32>,
        ensured: Vec<String>,
        selected: Option<String>,
        copies: Vec<(u32, String)>,
        deleted: Vec<u32>,
        flags: Vec<(u32, Flag)>,
        expunges: u32,
        logged_out: bool,
        fail_select: bool,
        fail_copy_for: BTreeSet<u32>,
    }

    impl MailboxClient for FakeMailbox {
        fn ensure_folder(&mut self, name: &str) -> Result<(), ProtocolError> {
            self.ensured.push(name.to_string());
            Ok(())
        }
        fn select_folder(&mut self, name: &str) -> Result<(), ProtocolError> {
            if self.fail_select {
                return Err(ProtocolError::NotSelectable {
                    folder: name.to_string(),
                });
            }
            self.selected = Some(name.to_string());
            Ok(())
        }
        fn search_unseen(&mut self) -> Result<Vec<u32>, ProtocolError> {
            Ok(self.messages.keys().copied().collect())
        }
        fn fetch_raw(&mut self, seq: u32) -> Result<Vec<u8>, ProtocolError> {
            if self.vanished.contains(&seq) {
                return Err(ProtocolError::NotFound { seq });
            }
            self.messages
                .get(&seq)
                .cloned()
                .ok_or(ProtocolError::NotFound { seq })
        }
        fn set_flag(&mut self, seq: u32, flag: Flag) -> Result<(), ProtocolError> {
            self.flags.push((seq, flag));
            Ok(())
        }
        fn copy_to(&mut self, seq: u32, folder: &str) -> Result<(), ProtocolError> {
            if self.fail_copy_for.contains(&seq) {
                return Err(ProtocolError::Command {
                    command: "COPY".into(),
                    response: "NO quota exceeded".into(),
                });
            }
            self.copies.push((seq, folder.to_string()));
            Ok(())
        }
        fn mark_deleted(&mut self, seq: u32) -> Result<(), ProtocolError> {
            self.deleted.push(seq);
            Ok(())
        }
        fn expunge_all(&mut self) -> Result<(), ProtocolError> {
            self.expunges += 1;
            Ok(())
        }
        fn logout(&mut self) -> Result<(), ProtocolError> {
            self.logged_out = true;
            Ok(())
        }
    }

    /// Upload sink that fails any name containing a marker substring.
    #[derive(Default)]
    struct FakeSink {
        uploads: RefCell<Vec<String>>,
        fail_marker: Option<String>,
    }

    impl UploadSink for FakeSink {
        fn upload(&self, _bytes: &[u8], name: &str) -> Result<UploadResult, UploadError> {
            if let Some(ref marker) = self.fail_marker
                && name.contains(marker.as_str())
            {
                return Err(UploadError::Transport("connection reset".into()));
            }
            let mut uploads = self.uploads.borrow_mut();
            uploads.push(name.to_string());
            Ok(UploadResult {
                remote_id: format!("remote-{}", uploads.len()),
                remote_name: name.to_string(),
            })
        }
    }

    #[test]
    fn invoice_message_is_uploaded_and_archived() {
        let config = test_config();
        let sink = FakeSink::default();
        let mut mailbox = FakeMailbox::default();
        mailbox.messages.insert(
            1,
            email("Invoice #INV-2044 due", "see attached", &[("bill.pdf", "pdf")]),
        );

        let summary = Orchestrator::new(&config, &sink).run(&mut mailbox).unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.outcomes[0].state, MessageState::MarkedDeleted);
        assert_eq!(summary.outcomes[0].uploads.len(), 1);
        assert_eq!(sink.uploads.borrow().len(), 1);
        assert!(sink.uploads.borrow()[0].ends_with("_bill.pdf"));
        assert_eq!(mailbox.copies, vec![(1, "Processed".to_string())]);
        assert_eq!(mailbox.deleted, vec![1]);
        assert_eq!(mailbox.expunges, 1);
        assert!(mailbox.logged_out);
    }

    #[test]
    fn non_invoice_is_left_unread() {
        let config = test_config();
        let sink = FakeSink::default();
        let mut mailbox = FakeMailbox::default();
        mailbox.messages.insert(
            1,
            email("Team lunch photos", "enjoy", &[("photo.png", "png")]),
        );

        let summary = Orchestrator::new(&config, &sink).run(&mut mailbox).unwrap();

        assert_eq!(summary.left, 1);
        assert_eq!(summary.outcomes[0].state, MessageState::Left);
        assert!(sink.uploads.borrow().is_empty());
        assert!(mailbox.copies.is_empty());
        assert!(mailbox.deleted.is_empty());
        assert!(mailbox.flags.is_empty());
    }

    #[test]
    fn keyword_match_without_attachment_is_left() {
        let config = test_config();
        let sink = FakeSink::default();
        let mut mailbox = FakeMailbox::default();
        mailbox
            .messages
            .insert(1, email("Invoice reminder", "payment due", &[]));

        let summary = Orchestrator::new(&config, &sink).run(&mut mailbox).unwrap();

        assert_eq!(summary.left, 1);
        assert!(sink.uploads.borrow().is_empty());
    }

    #[test]
    fn upload_failure_is_isolated_to_its_message() {
        let config = test_config();
        let sink = FakeSink {
            fail_marker: Some("broken".into()),
            ..Default::default()
        };
        let mut mailbox = FakeMailbox::default();
        mailbox.messages.insert(
            1,
            email("Invoice A", "first", &[("a.pdf", "pdf")]),
        );
        mailbox.messages.insert(
            2,
            email("Invoice B", "second", &[("broken.pdf", "pdf")]),
        );
        mailbox
            .messages
            .insert(3, email("Lunch", "no keywords", &[("c.pdf", "pdf")]));

        let summary = Orchestrator::new(&config, &sink).run(&mut mailbox).unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.left, 1);
        assert_eq!(summary.outcomes[0].state, MessageState::MarkedDeleted);
        assert_eq!(summary.outcomes[1].state, MessageState::Failed);
        assert_eq!(summary.outcomes[2].state, MessageState::Left);

        // The failed message keeps its flags: no copy, no delete.
        assert_eq!(mailbox.copies, vec![(1, "Processed".to_string())]);
        assert_eq!(mailbox.deleted, vec![1]);
        let err = summary.outcomes[1].error.as_ref().unwrap();
        assert_eq!(err.stage, "upload");

        // Compaction and logout still run once.
        assert_eq!(mailbox.expunges, 1);
        assert!(mailbox.logged_out);
    }

    #[test]
    fn copy_failure_leaves_message_unseen() {
        let config = test_config();
        let sink = FakeSink::default();
        let mut mailbox = FakeMailbox::default();
        mailbox.messages.insert(
            4,
            email("Invoice late", "pay up", &[("late.pdf", "pdf")]),
        );
        mailbox.fail_copy_for.insert(4);

        let summary = Orchestrator::new(&config, &sink).run(&mut mailbox).unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.outcomes[0].state, MessageState::Failed);
        assert_eq!(summary.outcomes[0].error.as_ref().unwrap().stage, "transition");
        // Uploaded (at-least-once semantics), but never marked deleted.
        assert_eq!(summary.outcomes[0].uploads.len(), 1);
        assert!(mailbox.deleted.is_empty());
        assert!(mailbox.flags.is_empty());
    }

    #[test]
    fn vanished_message_fails_and_batch_continues() {
        let config = test_config();
        let sink = FakeSink::default();
        let mut mailbox = FakeMailbox::default();
        mailbox
            .messages
            .insert(1, email("Invoice X", "x", &[("x.pdf", "pdf")]));
        mailbox.messages.insert(2, vec![]);
        mailbox.vanished.insert(2);

        let summary = Orchestrator::new(&config, &sink).run(&mut mailbox).unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.outcomes[1].error.as_ref().unwrap().stage, "fetch");
    }

    #[test]
    fn setup_failure_aborts_batch_but_logs_out() {
        let config = test_config();
        let sink = FakeSink::default();
        let mut mailbox = FakeMailbox {
            fail_select: true,
            ..Default::default()
        };

        let err = Orchestrator::new(&config, &sink).run(&mut mailbox).unwrap_err();
        assert!(matches!(err, ProtocolError::NotSelectable { .. }));
        assert!(mailbox.logged_out);
        assert_eq!(mailbox.expunges, 0);
    }

    #[test]
    fn processed_folder_ensured_before_select() {
        let config = test_config();
        let sink = FakeSink::default();
        let mut mailbox = FakeMailbox::default();

        let summary = Orchestrator::new(&config, &sink).run(&mut mailbox).unwrap();
        assert_eq!(summary.processed + summary.left + summary.failed, 0);
        assert_eq!(mailbox.ensured, vec!["Processed".to_string()]);
        assert_eq!(mailbox.selected.as_deref(), Some("INBOX"));
    }

    #[test]
    fn multiple_attachments_all_uploaded() {
        let config = test_config();
        let sink = FakeSink::default();
        let mut mailbox = FakeMailbox::default();
        mailbox.messages.insert(
            1,
            email(
                "Invoice pair",
                "both attached",
                &[("one.pdf", "1"), ("two.pdf", "2"), ("skip.png", "3")],
            ),
        );

        let summary = Orchestrator::new(&config, &sink).run(&mut mailbox).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.outcomes[0].uploads.len(), 2);
        assert_eq!(sink.uploads.borrow().len(), 2);
    }
}
