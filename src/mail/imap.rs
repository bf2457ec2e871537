//! Mailbox inspector speaking raw IMAP over TLS.
//!
//! Sessions are short-lived: each operation opens its own connection, runs
//! its tagged commands, and logs out. That keeps the bounded search pool
//! free of a shared connection and guarantees nothing is held across the
//! settlement barrier. All blocking I/O runs under `spawn_blocking`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use mail_parser::MessageParser;

use crate::config::ImapConfig;
use crate::error::{CleanupError, ConnectivityError, InspectError};
use crate::mail::{MailboxInspector, MessageRef};

const READ_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ImapInspector {
    config: ImapConfig,
}

impl ImapInspector {
    pub fn new(config: &ImapConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Run `op` against a fresh session on the blocking pool.
    async fn with_session<T, F>(&self, op: F) -> Result<T, InspectError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, InspectError> + Send + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::open(&config)?;
            let result = op(&mut session);
            session.logout();
            result
        })
        .await
        .map_err(|e| InspectError::Connect(format!("inspection task failed: {e}")))?
    }
}

#[async_trait::async_trait]
impl MailboxInspector for ImapInspector {
    async fn check(&self) -> Result<(), ConnectivityError> {
        let host = self.config.host.clone();
        let port = self.config.port;
        self.with_session(|_| Ok(()))
            .await
            .map_err(|e| ConnectivityError::Imap {
                host,
                port,
                reason: format!("{e}"),
            })
    }

    async fn list_folders(&self) -> Result<Vec<String>, InspectError> {
        self.with_session(|session| session.list_folders()).await
    }

    async fn search_header(
        &self,
        folder: &str,
        header: &str,
        value: &str,
    ) -> Result<Vec<MessageRef>, InspectError> {
        let folder = folder.to_string();
        let query = format!("HEADER {header} \"{value}\"");
        self.with_session(move |session| session.search(&folder, &query))
            .await
    }

    async fn search_body(
        &self,
        folder: &str,
        needle: &str,
    ) -> Result<Vec<MessageRef>, InspectError> {
        let folder = folder.to_string();
        let query = format!("TEXT \"{needle}\"");
        self.with_session(move |session| session.search(&folder, &query))
            .await
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), CleanupError> {
        let folder = message.folder.clone();
        let uid = message.uid;
        self.with_session(move |session| session.delete(&folder, uid))
            .await
            .map_err(|e| CleanupError::DeleteFailed {
                folder: message.folder.clone(),
                uid,
                reason: format!("{e}"),
            })
    }
}

/// One logged-in IMAP connection.
struct ImapSession {
    tls: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
    tag: u32,
}

impl ImapSession {
    fn open(config: &ImapConfig) -> Result<Self, InspectError> {
        let tcp = TcpStream::connect((&*config.host, config.port))
            .map_err(|e| InspectError::Connect(format!("{}:{}: {e}", config.host, config.port)))?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.host.clone())
            .map_err(|e| InspectError::Tls(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| InspectError::Tls(format!("{e}")))?;
        let tls = rustls::StreamOwned::new(conn, tcp);

        let mut session = Self { tls, tag: 0 };
        let _greeting = session.read_line()?;

        let login = session.command(&format!(
            "LOGIN \"{}\" \"{}\"",
            config.username, config.password
        ))?;
        if !response_ok(&login) {
            return Err(InspectError::Login {
                username: config.username.clone(),
            });
        }

        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, InspectError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => return Err(InspectError::Connect("connection closed".into())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send one tagged command and collect every response line up to the
    /// tagged completion line.
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, InspectError> {
        self.tag += 1;
        let tag = format!("R{}", self.tag);
        let full = format!("{tag} {cmd}\r\n");
        self.tls.write_all(full.as_bytes())?;
        self.tls.flush()?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = tagged_completion(&line, &tag);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    fn command_ok(&mut self, cmd: &str) -> Result<Vec<String>, InspectError> {
        let lines = self.command(cmd)?;
        if response_ok(&lines) {
            Ok(lines)
        } else {
            Err(InspectError::Command {
                command: cmd.split_whitespace().next().unwrap_or(cmd).to_string(),
                reason: lines.last().cloned().unwrap_or_default().trim().to_string(),
            })
        }
    }

    fn list_folders(&mut self) -> Result<Vec<String>, InspectError> {
        let lines = self.command_ok("LIST \"\" \"*\"")?;
        Ok(lines
            .iter()
            .filter_map(|line| parse_list_line(line))
            .collect())
    }

    /// UID SEARCH in one folder; fetches the subject of each hit.
    fn search(&mut self, folder: &str, query: &str) -> Result<Vec<MessageRef>, InspectError> {
        self.command_ok(&format!("EXAMINE \"{folder}\""))?;
        let lines = self.command_ok(&format!("UID SEARCH {query}"))?;

        let mut refs = Vec::new();
        for uid in parse_search_uids(&lines) {
            let subject = self.fetch_subject(uid);
            refs.push(MessageRef {
                folder: folder.to_string(),
                uid,
                subject,
            });
        }
        Ok(refs)
    }

    /// Best-effort subject fetch; a parse failure leaves it empty.
    fn fetch_subject(&mut self, uid: u32) -> Option<String> {
        let lines = self.command(&format!("UID FETCH {uid} (RFC822)")).ok()?;
        let raw: String = lines
            .iter()
            .skip(1)
            .take(lines.len().saturating_sub(2))
            .cloned()
            .collect();
        MessageParser::default()
            .parse(raw.as_bytes())
            .and_then(|parsed| parsed.subject().map(|s| s.to_string()))
    }

    fn delete(&mut self, folder: &str, uid: u32) -> Result<(), InspectError> {
        self.command_ok(&format!("SELECT \"{folder}\""))?;
        self.command_ok(&format!("UID STORE {uid} +FLAGS (\\Deleted)"))?;
        self.command_ok("EXPUNGE")?;
        Ok(())
    }

    fn logout(&mut self) {
        let _ = self.command("LOGOUT");
    }
}

/// A completion line is the tag followed by a space. A literal body line
/// that merely begins with the tag text does not end the command.
fn tagged_completion(line: &str, tag: &str) -> bool {
    line.strip_prefix(tag)
        .is_some_and(|rest| rest.starts_with(' '))
}

fn response_ok(lines: &[String]) -> bool {
    lines
        .last()
        .is_some_and(|l| l.split_whitespace().nth(1) == Some("OK"))
}

/// Extract the folder name from a `* LIST (...) "<delim>" <name>` line.
fn parse_list_line(line: &str) -> Option<String> {
    if !line.starts_with("* LIST") {
        return None;
    }
    let rest = line.split_once(')')?.1.trim();
    // rest = `"<delim>" <name>` — the name may be quoted or a bare atom
    let name = rest.split_once(' ')?.1.trim().trim_end_matches("\r\n");
    let name = name.trim().trim_matches('"');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Collect UIDs from `* SEARCH <uid> <uid> ...` lines.
fn parse_search_uids(lines: &[String]) -> Vec<u32> {
    let mut uids = Vec::new();
    for line in lines {
        if let Some(rest) = line.strip_prefix("* SEARCH") {
            uids.extend(rest.split_whitespace().filter_map(|n| n.parse::<u32>().ok()));
        }
    }
    uids
}
