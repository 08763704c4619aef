//! Message decoding — raw RFC822 bytes to subject, merged body, attachments.
//!
//! All decoding is best-effort and never errors: an undecodable subject or
//! part contributes empty text, and an unparseable message yields an empty
//! `Message`. The part tree is traversed through pure queries over the
//! `mail-parser` structure; no I/O happens here.

use mail_parser::{MessageParser, MimeHeaders};

/// A decoded attachment part.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Filename as carried by the part, encoded-words decoded.
    pub filename: String,
    /// MIME type, e.g. `application/pdf`.
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A decoded message: subject, merged body text, ordered attachments.
///
/// Identity (the mailbox sequence id) is tracked by the orchestrator, not
/// here — the same raw bytes decode identically regardless of origin.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

/// Decode raw message bytes. Never fails; a message `mail-parser` cannot
/// make sense of decodes to empty subject/body and no attachments.
pub fn parse(raw: &[u8]) -> Message {
    let Some(parsed) = MessageParser::default().parse(raw) else {
        return Message::default();
    };

    Message {
        subject: parsed.subject().unwrap_or_default().to_string(),
        body: merged_body(&parsed),
        attachments: collect_attachments(&parsed),
    }
}

/// Concatenate body text in document order: every text/plain part, falling
/// back to tag-stripped text/html when the message has no plain part.
fn merged_body(parsed: &mail_parser::Message) -> String {
    let mut sections: Vec<String> = Vec::new();

    let mut i = 0;
    while let Some(text) = parsed.body_text(i) {
        sections.push(text.to_string());
        i += 1;
    }

    if sections.is_empty() {
        let mut i = 0;
        while let Some(html) = parsed.body_html(i) {
            sections.push(strip_html(html.as_ref()));
            i += 1;
        }
    }

    sections.join("\n")
}

/// A part qualifies as an attachment iff its disposition is "attachment"
/// and it carries a filename. Inline images and body alternatives are not
/// attachments.
fn collect_attachments(parsed: &mail_parser::Message) -> Vec<Attachment> {
    parsed
        .attachments()
        .filter(|part| is_attachment_disposition(part))
        .filter_map(|part| {
            let filename = part.attachment_name()?.to_string();
            Some(Attachment {
                filename,
                mime_type: mime_type(part),
                bytes: part.contents().to_vec(),
            })
        })
        .collect()
}

fn is_attachment_disposition(part: &mail_parser::MessagePart) -> bool {
    part.content_disposition()
        .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"))
}

fn mime_type(part: &mail_parser::MessagePart) -> String {
    match part.content_type() {
        Some(ct) => match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        },
        None => "application/octet-stream".to_string(),
    }
}

/// Strip HTML tags from content (basic) and normalize whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
