//! Remote object storage upload.
//!
//! The pipeline depends only on the narrow `upload(bytes, name) → remote id`
//! shape; [`HttpUploadSink`] is one provider speaking multipart HTTP. No
//! retry happens here — a failed upload fails only the current message and
//! the next run retries it from the source side.

use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::UploadError;
use crate::pipeline::types::UploadResult;

/// Storage upload boundary.
pub trait UploadSink {
    /// Upload `bytes` under `name`, returning the store-assigned id. The id
    /// is opaque; nothing beyond uniqueness is guaranteed.
    fn upload(&self, bytes: &[u8], name: &str) -> Result<UploadResult, UploadError>;
}

/// Multipart-POST sink: file part plus destination folder id, JSON response
/// carrying the remote id.
pub struct HttpUploadSink {
    client: reqwest::blocking::Client,
    url: String,
    folder: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoredObject {
    id: String,
}

impl HttpUploadSink {
    pub fn new(config: &Config) -> Result<Self, UploadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: config.storage_url.clone(),
            folder: config.storage_folder.clone(),
            token: config
                .storage_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
        })
    }
}

impl UploadSink for HttpUploadSink {
    fn upload(&self, bytes: &[u8], name: &str) -> Result<UploadResult, UploadError> {
        let form = reqwest::blocking::multipart::Form::new()
            .text("name", name.to_string())
            .text("folder", self.folder.clone())
            .part(
                "file",
                reqwest::blocking::multipart::Part::bytes(bytes.to_vec())
                    .file_name(name.to_string()),
            );

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        let remote_id = parse_stored_id(&body)?;
        debug!(name = %name, remote_id = %remote_id, "Uploaded attachment");

        Ok(UploadResult {
            remote_id,
            remote_name: name.to_string(),
        })
    }
}

/// Pull the remote id out of the storage response body.
fn parse_stored_id(body: &str) -> Result<String, UploadError> {
    let parsed: StoredObject =
        serde_json::from_str(body).map_err(|e| UploadError::BadResponse(e.to_string()))?;
    if parsed.id.is_empty() {
        return Err(UploadError::BadResponse("empty id field".to_string()));
    }
    Ok(parsed.id)
}
