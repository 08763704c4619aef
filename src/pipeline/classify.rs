//! Heuristic invoice gate.
//!
//! A keyword matches as a case-insensitive substring of subject or body.
//! Keywords alone are not enough: a message is an invoice only when at
//! least one attachment also survived the extension filter, because the
//! downstream OCR stage has nothing to work with otherwise.

use std::collections::BTreeSet;

use crate::pipeline::types::ClassificationResult;

/// Classify one message. `qualifying_attachments` is the count of
/// attachments that survived the [`filter`](crate::pipeline::filter) step.
pub fn classify(
    subject: &str,
    body: &str,
    keywords: &[String],
    qualifying_attachments: usize,
) -> ClassificationResult {
    let subject_lower = subject.to_lowercase();
    let body_lower = body.to_lowercase();

    let matched_terms: BTreeSet<String> = keywords
        .iter()
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .filter(|term| subject_lower.contains(term.as_str()) || body_lower.contains(term.as_str()))
        .collect();

    let is_invoice = !matched_terms.is_empty() && qualifying_attachments > 0;

    ClassificationResult {
        matched_terms,
        is_invoice,
    }
}
