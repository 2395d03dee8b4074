//! Support mailbox: IMAP over rustls for inbound, SMTP via lettre for replies.
//!
//! Both protocols are blocking and run inside `spawn_blocking`.

use std::io::{Read, Write as IoWrite};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::channels::email_types::{parse_message, partition_inbound};
use crate::channels::{MailSink, MailSource};
use crate::config::{Lookup, parse_or};
use crate::error::{ChannelError, ConfigError};
use crate::pipeline::types::InboundMail;

/// Subject used for every outgoing reply.
pub const REPLY_SUBJECT: &str = "Re: Ваше обращение в службу поддержки";

const IMAP_TIMEOUT: Duration = Duration::from_secs(30);

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub allowed_senders: Vec<String>,
}

impl EmailConfig {
    /// Returns `None` when `EMAIL_IMAP_HOST` is unset (mailbox disabled).
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Option<Self>, ConfigError> {
        let Some(imap_host) = lookup("EMAIL_IMAP_HOST").filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let username = lookup("EMAIL_USERNAME").unwrap_or_default();
        let password = lookup("EMAIL_PASSWORD").ok_or_else(|| ConfigError::MissingRequired {
            key: "EMAIL_PASSWORD".into(),
            hint: "Required when EMAIL_IMAP_HOST is set".into(),
        })?;

        let allowed_senders: Vec<String> = lookup("EMAIL_ALLOWED_SENDERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Some(Self {
            imap_port: parse_or(lookup, "EMAIL_IMAP_PORT", 993)?,
            smtp_host: lookup("EMAIL_SMTP_HOST").unwrap_or_else(|| imap_host.replace("imap", "smtp")),
            smtp_port: parse_or(lookup, "EMAIL_SMTP_PORT", 587)?,
            from_address: lookup("EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone()),
            password: SecretString::from(password),
            username,
            imap_host,
            allowed_senders,
        }))
    }
}

// ── IMAP ────────────────────────────────────────────────────────────

type ImapError = Box<dyn std::error::Error + Send + Sync>;

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Tagged response lines plus any literal payloads (`{n}` blocks).
#[derive(Debug, Default)]
struct ImapResponse {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

/// One authenticated IMAP connection with `INBOX` selected.
struct ImapSession {
    tls: TlsStream,
    tag: u32,
}

impl ImapSession {
    fn open(config: &EmailConfig) -> Result<Self, ImapError> {
        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))?;
        tcp.set_read_timeout(Some(IMAP_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)?;

        let mut session = Self {
            tls: rustls::StreamOwned::new(conn, tcp),
            tag: 0,
        };
        let _greeting = session.read_line()?;

        session
            .command(&format!(
                "LOGIN {} {}",
                quote(&config.username),
                quote(config.password.expose_secret())
            ))
            .map_err(|e| ChannelError::AuthFailed { name: "imap".into(), reason: e.to_string() })?;
        session.command("SELECT \"INBOX\"")?;
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, ImapError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => return Err("IMAP connection closed".into()),
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

    /// Send a command and collect the response up to its tagged status line.
    /// A status other than `OK` is an error.
    fn command(&mut self, cmd: &str) -> Result<ImapResponse, ImapError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        self.tls.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.tls.flush()?;

        let mut response = ImapResponse::default();
        loop {
            let line = self.read_line()?;
            if let Some(len) = literal_len(&line) {
                let mut literal = vec![0u8; len];
                self.tls.read_exact(&mut literal)?;
                response.literals.push(literal);
            }
            if let Some(status) = line.strip_prefix(&format!("{tag} ")) {
                if !status.starts_with("OK") {
                    return Err(format!("IMAP command failed: {}", status.trim_end()).into());
                }
                response.lines.push(line);
                return Ok(response);
            }
            response.lines.push(line);
        }
    }

    fn logout(mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "IMAP logout failed");
        }
    }
}

/// IMAP quoted string.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Length of a trailing `{n}` literal marker, if any.
fn literal_len(line: &str) -> Option<usize> {
    let line = line.trim_end();
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].parse().ok()
}

fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

/// Fetch every unseen message without setting `\Seen`.
///
/// Returns the parsed mail and the UIDs of messages that could not be parsed.
fn fetch_unseen_imap(config: &EmailConfig) -> Result<(Vec<InboundMail>, Vec<String>), ImapError> {
    let mut session = ImapSession::open(config)?;

    let search = session.command("UID SEARCH UNSEEN")?;
    let uids = parse_search(&search.lines);

    let mut mails = Vec::with_capacity(uids.len());
    let mut unparseable = Vec::new();
    for uid in uids {
        let fetched = session.command(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
        match fetched.literals.first().and_then(|raw| parse_message(&uid, raw)) {
            Some(mail) => mails.push(mail),
            None => {
                warn!(uid = %uid, "Skipping unparseable email");
                unparseable.push(uid);
            }
        }
    }

    session.logout();
    Ok((mails, unparseable))
}

/// Run a blocking IMAP exchange. Typed failures such as a rejected login
/// come back as they are, anything else is wrapped by `wrap`.
async fn run_imap<T, F>(op: F, wrap: impl FnOnce(String) -> ChannelError) -> Result<T, ChannelError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ImapError> + Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => match e.downcast::<ChannelError>() {
            Ok(typed) => Err(*typed),
            Err(other) => Err(wrap(other.to_string())),
        },
        Err(join) => Err(wrap(join.to_string())),
    }
}

fn mark_seen_imap(config: &EmailConfig, uids: &[String]) -> Result<(), ImapError> {
    let mut session = ImapSession::open(config)?;
    session.command(&format!("UID STORE {} +FLAGS (\\Seen)", uids.join(",")))?;
    session.logout();
    Ok(())
}

// ── Mailbox adapters ────────────────────────────────────────────────

/// IMAP-backed [`MailSource`]. Mail skipped during fetch, including
/// messages that fail to parse, is marked seen and never returned.
pub struct ImapMailbox {
    config: Arc<EmailConfig>,
}

impl ImapMailbox {
    pub fn new(config: EmailConfig) -> Self {
        Self { config: Arc::new(config) }
    }

    async fn store_seen(&self, uids: Vec<String>) -> Result<(), ChannelError> {
        let config = Arc::clone(&self.config);
        run_imap(move || mark_seen_imap(&config, &uids), |reason| ChannelError::SendFailed {
            name: "imap".into(),
            reason,
        })
        .await
    }
}

#[async_trait]
impl MailSource for ImapMailbox {
    async fn fetch_unseen(&self) -> Result<Vec<InboundMail>, ChannelError> {
        let config = Arc::clone(&self.config);
        let (mails, unparseable) = run_imap(move || fetch_unseen_imap(&config), |reason| {
            ChannelError::FetchFailed { name: "imap".into(), reason }
        })
        .await?;

        let (accepted, mut skipped) =
            partition_inbound(mails, &self.config.allowed_senders, &self.config.from_address);
        skipped.extend(unparseable);
        if !skipped.is_empty()
            && let Err(e) = self.store_seen(skipped).await
        {
            warn!(error = %e, "Failed to mark skipped emails as seen");
        }
        Ok(accepted)
    }

    async fn mark_seen(&self, uids: &[String]) -> Result<(), ChannelError> {
        if uids.is_empty() {
            return Ok(());
        }
        self.store_seen(uids.to_vec()).await
    }
}

/// SMTP-backed [`MailSink`].
pub struct SmtpMailer {
    config: Arc<EmailConfig>,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config: Arc::new(config) }
    }

    fn build_message(&self, to: &str, text: &str) -> Result<Message, ChannelError> {
        let failed = |reason: String| ChannelError::SendFailed { name: "smtp".into(), reason };
        Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| failed(format!("Invalid from address: {e}")))?,
            )
            .to(to.parse().map_err(|e| failed(format!("Invalid to address: {e}")))?)
            .subject(REPLY_SUBJECT)
            .body(text.to_string())
            .map_err(|e| failed(format!("Failed to build email: {e}")))
    }
}

fn send_smtp(config: &EmailConfig, message: &Message) -> Result<(), ChannelError> {
    let failed = |reason: String| ChannelError::SendFailed { name: "smtp".into(), reason };

    // 465 is implicit TLS, everything else negotiates STARTTLS.
    let builder = if config.smtp_port == 465 {
        SmtpTransport::relay(&config.smtp_host)
    } else {
        SmtpTransport::starttls_relay(&config.smtp_host)
    }
    .map_err(|e| failed(format!("SMTP relay error: {e}")))?;

    let transport = builder
        .port(config.smtp_port)
        .credentials(Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        ))
        .build();

    transport
        .send(message)
        .map_err(|e| failed(format!("SMTP send failed: {e}")))?;
    Ok(())
}

#[async_trait]
impl MailSink for SmtpMailer {
    async fn send(&self, to: &str, text: &str) -> Result<(), ChannelError> {
        let message = self.build_message(to, text)?;
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || send_smtp(&config, &message))
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "smtp".into(),
                reason: format!("SMTP task failed: {e}"),
            })??;
        info!(to = %to, "Reply email sent");
        Ok(())
    }
}
