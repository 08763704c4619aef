//! Raw IMAP4rev1 session over rustls.
//!
//! Tagged command loop: write `A{n} CMD`, collect untagged lines until the
//! matching completion arrives. Response reading is literal-aware — a line
//! ending in `{n}` is followed by exactly n bytes of payload, which is how
//! `FETCH BODY.PEEK[]` returns the exact raw message (splitting on CRLF
//! would corrupt binary attachments).
//!
//! Blocking by design: the socket carries the configured read timeout and
//! the orchestrator sequences every command. Run it under
//! `tokio::task::spawn_blocking` from async code.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::Config;
use crate::error::ProtocolError;
use crate::mailbox::{Flag, MailboxClient};

/// An authenticated IMAP session.
pub struct ImapSession {
    stream: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
    tag: u32,
}

/// One untagged response line, with its literal payload if it carried one.
struct ResponseLine {
    text: String,
    literal: Option<Vec<u8>>,
}

/// A complete command response: untagged lines plus the completion text
/// (tag stripped, so it starts with OK/NO/BAD).
struct Response {
    untagged: Vec<ResponseLine>,
    completion: String,
}

impl Response {
    fn is_ok(&self) -> bool {
        self.completion.starts_with("OK")
    }
}

impl ImapSession {
    /// Connect over TLS and authenticate. The socket read/write timeout is
    /// taken from config; a timeout here is session-fatal.
    pub fn connect(config: &Config) -> Result<Self, ProtocolError> {
        let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))?;
        tcp.set_read_timeout(Some(config.timeout))?;
        tcp.set_write_timeout(Some(config.timeout))?;

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| ProtocolError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| ProtocolError::Tls(e.to_string()))?;

        let mut session = Self {
            stream: rustls::StreamOwned::new(conn, tcp),
            tag: 0,
        };

        let greeting = session.read_line()?;
        debug!(greeting = %greeting, "IMAP connected");

        let resp = session.command(&format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        ))?;
        if !resp.is_ok() {
            return Err(ProtocolError::AuthFailed {
                response: resp.completion,
            });
        }
        debug!(user = %config.username, "IMAP authenticated");

        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, ProtocolError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(ProtocolError::ConnectionClosed),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        buf.truncate(buf.len() - 2);
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
                Err(e) => return Err(ProtocolError::Io(e)),
            }
        }
    }

    /// Read one logical response line, consuming literal payloads inline.
    /// Our commands carry at most one literal per line (the FETCH body).
    fn read_response_line(&mut self) -> Result<ResponseLine, ProtocolError> {
        let mut text = String::new();
        let mut literal = None;
        loop {
            let line = self.read_line()?;
            text.push_str(&line);
            match literal_len(&line) {
                Some(n) => {
                    let mut bytes = vec![0u8; n];
                    self.stream.read_exact(&mut bytes)?;
                    literal = Some(bytes);
                }
                None => return Ok(ResponseLine { text, literal }),
            }
        }
    }

    /// Send one tagged command and collect its full response.
    fn command(&mut self, cmd: &str) -> Result<Response, ProtocolError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        self.stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.stream.flush()?;

        let done_prefix = format!("{tag} ");
        let mut untagged = Vec::new();
        loop {
            let line = self.read_response_line()?;
            if let Some(rest) = line.text.strip_prefix(&done_prefix) {
                return Ok(Response {
                    untagged,
                    completion: rest.trim_start().to_string(),
                });
            }
            untagged.push(line);
        }
    }

    fn simple(&mut self, name: &'static str, cmd: &str) -> Result<(), ProtocolError> {
        let resp = self.command(cmd)?;
        if resp.is_ok() {
            Ok(())
        } else {
            Err(ProtocolError::Command {
                command: name.to_string(),
                response: resp.completion,
            })
        }
    }
}

impl MailboxClient for ImapSession {
    fn ensure_folder(&mut self, name: &str) -> Result<(), ProtocolError> {
        let resp = self.command(&format!("CREATE {}", quote(name)))?;
        // Servers answer NO [ALREADYEXISTS] (or similar) for a pre-existing
        // folder; that counts as success.
        if resp.is_ok() || folder_already_exists(&resp.completion) {
            Ok(())
        } else {
            Err(ProtocolError::Command {
                command: "CREATE".to_string(),
                response: resp.completion,
            })
        }
    }

    fn select_folder(&mut self, name: &str) -> Result<(), ProtocolError> {
        let resp = self.command(&format!("SELECT {}", quote(name)))?;
        if resp.is_ok() {
            debug!(folder = %name, "Folder selected");
            Ok(())
        } else {
            Err(ProtocolError::NotSelectable {
                folder: name.to_string(),
            })
        }
    }

    fn search_unseen(&mut self) -> Result<Vec<u32>, ProtocolError> {
        let resp = self.command("SEARCH UNSEEN")?;
        if !resp.is_ok() {
            return Err(ProtocolError::Command {
                command: "SEARCH".to_string(),
                response: resp.completion,
            });
        }
        let mut seqs = parse_search(resp.untagged.iter().map(|l| l.text.as_str()));
        seqs.sort_unstable();
        Ok(seqs)
    }

    fn fetch_raw(&mut self, seq: u32) -> Result<Vec<u8>, ProtocolError> {
        // BODY.PEEK[] keeps the Unseen flag untouched, so an abandoned
        // message is naturally retried by the next run's search.
        let resp = self.command(&format!("FETCH {seq} (BODY.PEEK[])"))?;
        if !resp.is_ok() {
            return Err(ProtocolError::Command {
                command: "FETCH".to_string(),
                response: resp.completion,
            });
        }
        resp.untagged
            .into_iter()
            .find(|l| l.text.contains("FETCH") && l.literal.is_some())
            .and_then(|l| l.literal)
            .ok_or(ProtocolError::NotFound { seq })
    }

    fn set_flag(&mut self, seq: u32, flag: Flag) -> Result<(), ProtocolError> {
        self.simple("STORE", &format!("STORE {seq} +FLAGS ({})", flag.imap()))
    }

    fn copy_to(&mut self, seq: u32, folder: &str) -> Result<(), ProtocolError> {
        self.simple("COPY", &format!("COPY {seq} {}", quote(folder)))
    }

    fn mark_deleted(&mut self, seq: u32) -> Result<(), ProtocolError> {
        // Single round-trip for both flags: the Unseen watermark must only
        // ever be lost together with the deletion mark.
        self.simple("STORE", &format!("STORE {seq} +FLAGS (\\Deleted \\Seen)"))
    }

    fn expunge_all(&mut self) -> Result<(), ProtocolError> {
        self.simple("EXPUNGE", "EXPUNGE")
    }

    fn logout(&mut self) -> Result<(), ProtocolError> {
        self.simple("LOGOUT", "LOGOUT")
    }
}

/// Quote a string for an IMAP command argument.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Length of the literal announced at the end of a line, e.g.
/// `* 3 FETCH (BODY[] {4207}` → 4207.
fn literal_len(line: &str) -> Option<usize> {
    let rest = line.strip_suffix('}')?;
    let start = rest.rfind('{')?;
    rest[start + 1..].parse().ok()
}

/// Collect ids from `* SEARCH 4 8 15` untagged lines.
fn parse_search<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<u32> {
    let mut seqs = Vec::new();
    for line in lines {
        if let Some(rest) = line.strip_prefix("* SEARCH") {
            seqs.extend(rest.split_whitespace().filter_map(|t| t.parse::<u32>().ok()));
        }
    }
    seqs
}

fn folder_already_exists(completion: &str) -> bool {
    completion.to_ascii_lowercase().contains("exists")
}
