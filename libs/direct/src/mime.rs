//! RFC 5322 message assembly and parsing for the Direct payloads that
//! travel inside the S/MIME wrapper.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use uuid::Uuid;

use crate::error::DirectError;
use crate::Result;

const BASE64_LINE_WIDTH: usize = 76;

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Inner MIME message before signing and encryption.
#[derive(Debug, Clone)]
pub struct MimeMessage {
    pub message_id: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
    pub request_mdn: bool,
}

/// Headers and body recovered from a decrypted message.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    pub message_id: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub date: Option<String>,
    pub body: String,
    pub mdn_requested: bool,
}

fn domain_of(address: &str) -> &str {
    address.split('@').nth(1).unwrap_or("localhost")
}

/// Build the plaintext RFC 5322 message. Attachments switch the message to
/// multipart/mixed with base64 parts.
pub fn build_mime_message(message: &MimeMessage) -> String {
    let mut lines = vec![
        format!(
            "Message-ID: <{}@{}>",
            message.message_id,
            domain_of(&message.from)
        ),
        format!("Date: {}", Utc::now().to_rfc2822()),
        format!("From: {}", message.from),
        format!("To: {}", message.to.join(", ")),
        format!("Subject: {}", message.subject),
        "MIME-Version: 1.0".to_string(),
    ];
    if message.request_mdn {
        lines.push(format!("Disposition-Notification-To: {}", message.from));
    }

    if message.attachments.is_empty() {
        lines.push("Content-Type: text/plain; charset=utf-8".to_string());
        lines.push(String::new());
        lines.push(message.body.clone());
        return lines.join("\r\n");
    }

    let boundary = format!("----=_Part_{}", Uuid::new_v4());
    lines.push(format!(
        "Content-Type: multipart/mixed; boundary=\"{boundary}\""
    ));
    lines.push(String::new());
    lines.push(format!("--{boundary}"));
    lines.push("Content-Type: text/plain; charset=utf-8".to_string());
    lines.push(String::new());
    lines.push(message.body.clone());

    for attachment in &message.attachments {
        lines.push(format!("--{boundary}"));
        lines.push(format!(
            "Content-Type: {}; name=\"{}\"",
            attachment.content_type, attachment.filename
        ));
        lines.push("Content-Transfer-Encoding: base64".to_string());
        lines.push(format!(
            "Content-Disposition: attachment; filename=\"{}\"",
            attachment.filename
        ));
        lines.push(String::new());
        let encoded = BASE64.encode(&attachment.content);
        for chunk in encoded.as_bytes().chunks(BASE64_LINE_WIDTH) {
            lines.push(String::from_utf8_lossy(chunk).into_owned());
        }
    }
    lines.push(format!("--{boundary}--"));

    lines.join("\r\n")
}

/// Split headers from body and lift the fields the gateway cares about.
/// An MDN is requested when a Disposition-Notification-To header is
/// present.
pub fn parse_mime_message(raw: &str) -> Result<ParsedMessage> {
    let mut headers = Vec::new();
    let mut body_lines = Vec::new();
    let mut in_body = false;

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if in_body {
            body_lines.push(line);
            continue;
        }
        if line.is_empty() {
            in_body = true;
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let header = |name: &str| {
        headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    };

    let from = header("from")
        .ok_or_else(|| DirectError::Mime("missing From header".to_string()))?;
    let to: Vec<String> = header("to")
        .ok_or_else(|| DirectError::Mime("missing To header".to_string()))?
        .split(',')
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();

    Ok(ParsedMessage {
        message_id: header("message-id")
            .map(|id| id.trim_matches(['<', '>']).to_string()),
        from,
        to,
        subject: header("subject").unwrap_or_default(),
        date: header("date"),
        body: body_lines.join("\r\n"),
        mdn_requested: header("disposition-notification-to").is_some(),
    })
}

/// Build a message disposition notification for a received message.
/// `disposition` is the MDN disposition type, e.g. "displayed".
pub fn build_mdn(original: &ParsedMessage, from: &str, disposition: &str) -> String {
    let boundary = format!("----=_Part_{}", Uuid::new_v4());
    let original_id = original.message_id.as_deref().unwrap_or_default();
    let final_recipient = original
        .to
        .first()
        .map(String::as_str)
        .unwrap_or(from);

    let lines = vec![
        format!("Message-ID: <{}@{}>", Uuid::new_v4(), domain_of(from)),
        format!("Date: {}", Utc::now().to_rfc2822()),
        format!("From: {from}"),
        format!("To: {}", original.from),
        format!("Subject: Re: {}", original.subject),
        "MIME-Version: 1.0".to_string(),
        format!(
            "Content-Type: multipart/report; report-type=disposition-notification; boundary=\"{boundary}\""
        ),
        String::new(),
        format!("--{boundary}"),
        "Content-Type: text/plain; charset=utf-8".to_string(),
        String::new(),
        format!("Your message was {disposition}."),
        format!("--{boundary}"),
        "Content-Type: message/disposition-notification".to_string(),
        String::new(),
        "Reporting-UA: direct-messaging-service".to_string(),
        format!("Final-Recipient: rfc822;{final_recipient}"),
        format!("Original-Message-ID: <{original_id}>"),
        format!("Disposition: automatic-action/MDN-sent-automatically; {disposition}"),
        format!("--{boundary}--"),
    ];

    lines.join("\r\n")
}
