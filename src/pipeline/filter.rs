//! Attachment extension filtering and remote-name construction.

use crate::message::Attachment;

/// Keep only attachments whose filename extension is in the allow-list
/// (case-insensitive; entries may be written with or without a leading dot).
pub fn filter(attachments: Vec<Attachment>, allowed: &[String]) -> Vec<Attachment> {
    attachments
        .into_iter()
        .filter(|a| extension_allowed(&a.filename, allowed))
        .collect()
}

/// Whether `filename`'s extension is allow-listed.
pub fn extension_allowed(filename: &str, allowed: &[String]) -> bool {
    let Some(ext) = filename.rsplit_once('.').map(|(_, ext)| ext) else {
        return false;
    };
    let ext = ext.to_lowercase();
    allowed
        .iter()
        .map(|a| a.trim().trim_start_matches('.').to_lowercase())
        .filter(|a| !a.is_empty())
        .any(|a| a == ext)
}

/// Strip every character that is not alphanumeric, dot, underscore,
/// hyphen, or space. Idempotent.
pub fn sanitize(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect()
}

/// Remote name: upload-time seconds prefix plus the sanitized filename.
///
/// The timestamp is the upload moment, not the message's received time, so
/// re-processing in a later run produces a different remote name. No
/// content dedup happens here; that is a downstream concern.
pub fn rename(filename: &str, upload_secs: i64) -> String {
    format!("{upload_secs}_{}", sanitize(filename))
}
