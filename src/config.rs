//! Configuration, built from environment variables.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Invoice keywords matched against subject and body when no override is
/// configured.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "invoice",
    "bill",
    "payment",
    "receipt",
    "total",
    "amount",
    "due",
    "credit note",
    "statement",
];

/// Default attachment extension allow-list. The downstream OCR stage
/// consumes PDFs, so anything else is noise.
pub const DEFAULT_EXTENSIONS: &[&str] = &["pdf"];

/// Ingestion run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    /// Folder scanned for unseen messages.
    pub inbox: String,
    /// Archival destination for successfully handled messages.
    pub processed_folder: String,
    /// Storage upload endpoint (multipart POST).
    pub storage_url: String,
    /// Destination folder/collection identifier at the storage provider.
    pub storage_folder: String,
    /// Optional bearer token for the storage endpoint.
    pub storage_token: Option<SecretString>,
    /// Case-insensitive invoice keywords.
    pub keywords: Vec<String>,
    /// Case-insensitive extension allow-list (with or without leading dot).
    pub allowed_extensions: Vec<String>,
    /// Network timeout applied to the IMAP socket and upload requests.
    pub timeout: Duration,
}

impl Config {
    /// Build config from environment variables.
    ///
    /// `INGEST_IMAP_HOST`, `INGEST_IMAP_USERNAME`, `INGEST_IMAP_PASSWORD`
    /// and `INGEST_STORAGE_URL` are required; everything else has defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap_host = require("INGEST_IMAP_HOST")?;
        let username = require("INGEST_IMAP_USERNAME")?;
        let password = SecretString::from(require("INGEST_IMAP_PASSWORD")?);
        let storage_url = require("INGEST_STORAGE_URL")?;

        let imap_port = parse_or("INGEST_IMAP_PORT", 993)?;
        let timeout_secs: u64 = parse_or("INGEST_TIMEOUT_SECS", 30)?;

        let inbox = std::env::var("INGEST_INBOX").unwrap_or_else(|_| "INBOX".to_string());
        let processed_folder =
            std::env::var("INGEST_PROCESSED_FOLDER").unwrap_or_else(|_| "Processed".to_string());
        let storage_folder = std::env::var("INGEST_STORAGE_FOLDER").unwrap_or_default();
        let storage_token = std::env::var("INGEST_STORAGE_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(SecretString::from);

        let keywords = std::env::var("INGEST_KEYWORDS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_else(|_| DEFAULT_KEYWORDS.iter().map(|s| (*s).to_string()).collect());

        let allowed_extensions = std::env::var("INGEST_ALLOWED_EXTENSIONS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_else(|_| DEFAULT_EXTENSIONS.iter().map(|s| (*s).to_string()).collect());

        Ok(Self {
            imap_host,
            imap_port,
            username,
            password,
            inbox,
            processed_folder,
            storage_url,
            storage_folder,
            storage_token,
            keywords,
            allowed_extensions,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Split a comma-separated env value into trimmed, non-empty entries.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_trims_and_drops_empties() {
        let parsed = parse_list("invoice, bill , ,receipt,");
        assert_eq!(parsed, vec!["invoice", "bill", "receipt"]);
    }

    #[test]
    fn parse_list_empty_input() {
        assert!(parse_list("").is_empty());
        assert!(parse_list(" , ,").is_empty());
    }

    #[test]
    fn default_keywords_match_upstream_terms() {
        assert!(DEFAULT_KEYWORDS.contains(&"invoice"));
        assert!(DEFAULT_KEYWORDS.contains(&"credit note"));
        assert_eq!(DEFAULT_KEYWORDS.len(), 9);
    }

    #[test]
    fn from_env_requires_host() {
        // SAFETY: no other test in this crate touches these variables.
        unsafe { std::env::remove_var("INGEST_IMAP_HOST") };
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(k) if k == "INGEST_IMAP_HOST"));
    }
}
