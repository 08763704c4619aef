//! Error types for the ingestion pipeline.
//!
//! The taxonomy separates session-fatal failures from message-scoped ones:
//! a `ProtocolError` raised during setup (connect/select) aborts the run,
//! while every error that occurs inside a message's processing is wrapped in
//! a `MessageError` and recorded against that message only. Decode failures
//! never surface as errors at all — parsing degrades to empty content.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox protocol errors — network, TLS, auth, or a rejected command.
///
/// Fatal for the whole run when raised during connect or folder setup.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Authentication rejected: {response}")]
    AuthFailed { response: String },

    #[error("Folder '{folder}' is not selectable")]
    NotSelectable { folder: String },

    #[error("Message {seq} not found in selected folder")]
    NotFound { seq: u32 },

    #[error("{command} failed: {response}")]
    Command { command: String, response: String },
}

/// Upload failures from the storage sink. No retry happens at this level;
/// a failed upload fails only the current message, which stays unseen.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Storage rejected upload: HTTP {status}")]
    Rejected { status: u16 },

    #[error("Malformed storage response: {0}")]
    BadResponse(String),
}

/// Archival transition failures (copy into the processed folder or the
/// final flag write). The source message keeps its Unseen flag either way.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Copy to '{folder}' failed: {source}")]
    Copy {
        folder: String,
        #[source]
        source: ProtocolError,
    },

    #[error("Mark-deleted failed: {source}")]
    MarkDeleted {
        #[source]
        source: ProtocolError,
    },
}

/// A per-message failure, recorded in that message's outcome and never
/// propagated past the orchestrator's message boundary.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Message {seq} vanished before fetch")]
    NotFound { seq: u32 },

    #[error("Upload of '{filename}' failed: {source}")]
    Upload {
        filename: String,
        #[source]
        source: UploadError,
    },

    #[error("Archival transition failed: {0}")]
    Transition(#[from] TransitionError),

    #[error("Protocol failure during {stage}: {source}")]
    Protocol {
        stage: &'static str,
        #[source]
        source: ProtocolError,
    },
}

impl MessageError {
    /// The pipeline stage this error was raised in, for outcome reporting.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "fetch",
            Self::Upload { .. } => "upload",
            Self::Transition(_) => "transition",
            Self::Protocol { stage, .. } => stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_error_stage_labels() {
        assert_eq!(MessageError::NotFound { seq: 3 }.stage(), "fetch");
        assert_eq!(
            MessageError::Upload {
                filename: "bill.pdf".into(),
                source: UploadError::Rejected { status: 500 },
            }
            .stage(),
            "upload"
        );
        assert_eq!(
            MessageError::Transition(TransitionError::Copy {
                folder: "Processed".into(),
                source: ProtocolError::ConnectionClosed,
            })
            .stage(),
            "transition"
        );
        assert_eq!(
            MessageError::Protocol {
                stage: "fetch",
                source: ProtocolError::ConnectionClosed,
            }
            .stage(),
            "fetch"
        );
    }

    #[test]
    fn transition_error_carries_cause() {
        let err = TransitionError::Copy {
            folder: "Processed".into(),
            source: ProtocolError::Command {
                command: "COPY".into(),
                response: "NO quota exceeded".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("Processed"));
        assert!(msg.contains("quota exceeded"));
    }
}
