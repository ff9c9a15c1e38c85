//! Minimal async IMAP4rev1 client backing the mailbox adapter.
//!
//! Only the commands the fetch algorithm needs are implemented: `LOGIN`,
//! `SELECT`, `UID FETCH ... (BODY.PEEK[])`, `UID STORE ... +FLAGS.SILENT (\Seen)`
//! and `LOGOUT`. `imaps://` endpoints use implicit TLS through `tokio-rustls`
//! with the Mozilla root set from `webpki-roots`.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tracing::{debug, trace};

use super::initial_capacity;
use super::mailbox::{MailEndpoint, MailSession, MailStore};

/// Default time allowed for TCP connect plus TLS handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// [`MailStore`] speaking IMAP over TCP or TLS.
#[derive(Debug, Clone)]
pub struct ImapStore {
    connect_timeout: Duration,
}

impl Default for ImapStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl ImapStore {
    /// Creates a store with the given connect timeout.
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn tls_config() -> io::Result<Arc<ClientConfig>> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(io::Error::other)?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Arc::new(config))
    }

    async fn open_transport(&self, endpoint: &MailEndpoint) -> io::Result<Box<dyn Transport>> {
        let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        if !endpoint.secure {
            return Ok(Box::new(tcp));
        }
        let server_name = ServerName::try_from(endpoint.host.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let tls = TlsConnector::from(Self::tls_config()?)
            .connect(server_name, tcp)
            .await?;
        Ok(Box::new(tls))
    }
}

#[async_trait]
impl MailStore for ImapStore {
    async fn connect(&self, endpoint: &MailEndpoint) -> io::Result<Box<dyn MailSession>> {
        let transport = tokio::time::timeout(self.connect_timeout, self.open_transport(endpoint))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {}:{} timed out", endpoint.host, endpoint.port),
                )
            })??;
        let mut session = ImapSession {
            stream: BufReader::new(transport),
            next_tag: 1,
        };
        session.read_greeting().await?;
        if let Some(credentials) = &endpoint.credentials {
            let command = format!(
                "LOGIN {} {}",
                quote(credentials.account_name())?,
                quote(credentials.password())?
            );
            session.execute_quiet(&command).await?;
        }
        debug!(host = %endpoint.host, port = endpoint.port, "imap session established");
        Ok(Box::new(session))
    }
}

/// One untagged server response, with the literal it carried (if any).
#[derive(Debug, Default)]
struct Untagged {
    line: String,
    literal: Option<Vec<u8>>,
}

struct ImapSession {
    stream: BufReader<Box<dyn Transport>>,
    next_tag: u32,
}

impl ImapSession {
    async fn read_line(&mut self) -> io::Result<String> {
        let mut raw = Vec::new();
        let read = self.stream.read_until(b'\n', &mut raw).await?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "imap server closed the connection",
            ));
        }
        let line = String::from_utf8_lossy(&raw);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn read_greeting(&mut self) -> io::Result<()> {
        let greeting = self.read_line().await?;
        trace!(greeting = %greeting, "imap greeting");
        if greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH") {
            Ok(())
        } else {
            Err(protocol_error(format!("unexpected greeting: {greeting}")))
        }
    }

    async fn send(&mut self, command: &str) -> io::Result<String> {
        let tag = format!("a{}", self.next_tag);
        self.next_tag += 1;
        let stream = self.stream.get_mut();
        stream
            .write_all(format!("{tag} {command}\r\n").as_bytes())
            .await?;
        stream.flush().await?;
        Ok(tag)
    }

    async fn collect(&mut self, tag: &str) -> io::Result<Vec<Untagged>> {
        let mut responses = Vec::new();
        loop {
            let line = self.read_line().await?;
            if let Some(status) = line.strip_prefix(tag).map(str::trim_start) {
                if status.starts_with("OK") {
                    return Ok(responses);
                }
                return Err(protocol_error(format!("command failed: {status}")));
            }
            let mut response = Untagged {
                line,
                literal: None,
            };
            if let Some(size) = literal_size(&response.line) {
                let literal = self.read_literal(size).await?;
                let rest = self.read_line().await?;
                response.line.push_str(&rest);
                response.literal = Some(literal);
            }
            responses.push(response);
        }
    }

    /// Reads a `{size}` literal as the bytes arrive; the announced size only
    /// bounds the read.
    async fn read_literal(&mut self, size: u64) -> io::Result<Vec<u8>> {
        let mut literal = Vec::with_capacity(initial_capacity(Some(size)));
        let read = (&mut self.stream)
            .take(size)
            .read_to_end(&mut literal)
            .await?;
        if u64::try_from(read).unwrap_or(u64::MAX) < size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("imap literal ended after {read} of {size} bytes"),
            ));
        }
        Ok(literal)
    }

        async fn execute(&mut self, command: &str) -> io::Result<Vec<Untagged>> {
        let tag = self.send(command).await?;
        trace!(tag = %tag, command = %command, "imap command");
        self.collect(&tag).await
    }

    /// Like [`execute`](Self::execute) but never logs the command text.
    async fn execute_quiet(&mut self, command: &str) -> io::Result<Vec<Untagged>> {
        let tag = self.send(command).await?;
        self.collect(&tag).await
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn select_read_write(&mut self, folder: &str) -> io::Result<()> {
        self.execute(&format!("SELECT {}", quote(folder)?)).await?;
        Ok(())
    }

    async fn fetch_by_uid(&mut self, uid: u32) -> io::Result<Option<Vec<u8>>> {
        let responses = self
            .execute(&format!("UID FETCH {uid} (BODY.PEEK[])"))
            .await?;
        Ok(responses
            .into_iter()
            .find(|r| r.line.contains("FETCH") && r.literal.is_some())
            .and_then(|r| r.literal))
    }

    async fn mark_seen(&mut self, uid: u32) -> io::Result<()> {
        self.execute(&format!("UID STORE {uid} +FLAGS.SILENT (\\Seen)"))
            .await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> io::Result<()> {
        let mut session = self;
        session.execute("LOGOUT").await?;
        session.stream.get_mut().shutdown().await
    }
}

/// Returns `N` when `line` ends with a `{N}` literal announcement.
fn literal_size(line: &str) -> Option<u64> {
    let open = line.strip_suffix('}')?.rfind('{')?;
    line[open + 1..line.len() - 1].parse().ok()
}

/// Quotes an IMAP string argument.
fn quote(value: &str) -> io::Result<String> {
    if value.contains(['\r', '\n']) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "imap argument contains a line break",
        ));
    }
    Ok(format!(
        "\"{}\"",
        value.replace('\\', "\\\\").replace('"', "\\\"")
    ))
}

fn protocol_error(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}
