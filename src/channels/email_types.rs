//! Email parsing helpers: quote stripping, sender checks, body extraction.

use mail_parser::{MessageParser, MimeHeaders};

use crate::pipeline::types::InboundMail;

/// Strip quoted history from an email body.
///
/// Drops `>`-quoted lines and everything after a reply attribution
/// ("On ... wrote:", "... писал(а):") or an "Original Message" separator.
pub fn strip_quoted_text(body: &str) -> String {
    let mut result = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }

        if is_attribution(trimmed) || is_separator(trimmed) {
            break;
        }

        result.push(line);
    }

    while result.last().is_some_and(|l| l.trim().is_empty()) {
        result.pop();
    }

    result.join("\n")
}

fn is_attribution(line: &str) -> bool {
    (line.starts_with("On ") && line.ends_with("wrote:"))
        || line.ends_with("писал:")
        || line.ends_with("писала:")
        || line.ends_with("писал(а):")
}

fn is_separator(line: &str) -> bool {
    line.starts_with("---")
        && (line.contains("Original Message") || line.contains("Исходное сообщение"))
}

/// Check a sender against the allowlist.
///
/// - Empty list: deny all
/// - `*`: allow all
/// - `@domain.com` or `domain.com`: domain match
/// - `user@domain.com`: exact match
pub fn is_sender_allowed(allowed: &[String], email: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }
    if allowed.iter().any(|a| a == "*") {
        return true;
    }
    let email_lower = email.to_lowercase();
    allowed.iter().any(|a| {
        if a.starts_with('@') {
            email_lower.ends_with(&a.to_lowercase())
        } else if a.contains('@') {
            a.eq_ignore_ascii_case(email)
        } else {
            email_lower.ends_with(&format!("@{}", a.to_lowercase()))
        }
    })
}

/// Strip HTML tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_sender(parsed: &mail_parser::Message) -> Option<String> {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

/// Readable text: the plain part, else stripped HTML, else a text attachment.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    String::new()
}

/// Parse a raw RFC 822 message. `None` when unparseable or sender-less.
pub fn parse_message(uid: &str, raw: &[u8]) -> Option<InboundMail> {
    let parsed = MessageParser::default().parse(raw)?;
    let sender = extract_sender(&parsed)?;
    Some(InboundMail {
        uid: uid.to_string(),
        sender,
        subject: parsed.subject().unwrap_or_default().to_string(),
        body: strip_quoted_text(extract_text(&parsed).trim()),
    })
}

/// Split fetched mail into messages to process and uids to mark seen
/// without processing (our own replies and blocked senders).
pub fn partition_inbound(
    mails: Vec<InboundMail>,
    allowed: &[String],
    own_address: &str,
) -> (Vec<InboundMail>, Vec<String>) {
    let mut accepted = Vec::new();
    let mut skipped = Vec::new();
    for mail in mails {
        if mail.sender.eq_ignore_ascii_case(own_address) {
            tracing::debug!(uid = %mail.uid, "Skipping self-sent email");
            skipped.push(mail.uid);
        } else if !is_sender_allowed(allowed, &mail.sender) {
            tracing::warn!(sender = %mail.sender, "Blocked email from sender outside allowlist");
            skipped.push(mail.uid);
        } else {
            accepted.push(mail);
        }
    }
    (accepted, skipped)
}
