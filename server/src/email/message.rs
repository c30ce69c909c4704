use anyhow::anyhow;
use chrono::{DateTime, Utc};
use google_gmail1::api::{Message, MessagePart};
use regex::Regex;
use serde::Serialize;

const RE_ANGLE_ADDR_STR: &str = r"<([^>]+)>";
const RE_WHITESPACE_STR: &str = r"[\r\t\n]+";
const RE_LONG_SPACE_STR: &str = r" {2,}";

lazy_static::lazy_static!(
    static ref RE_ANGLE_ADDR: Regex = Regex::new(RE_ANGLE_ADDR_STR).unwrap();
    static ref RE_WHITESPACE: Regex = Regex::new(RE_WHITESPACE_STR).unwrap();
    static ref RE_LONG_SPACE: Regex = Regex::new(RE_LONG_SPACE_STR).unwrap();
);

/// Body text kept per message. Bounds memory and the prompt size downstream.
pub const BODY_CAP: usize = 1000;

const HTML_RENDER_WIDTH: usize = 400;

/// Canonical internal record for one mailbox item. Constructed fresh on
/// every fetch and immutable for the rest of the request; read-state
/// changes are only observable by fetching again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMessage {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: DateTime<Utc>,
    pub body: String,
    pub snippet: String,
    pub unread: bool,
    pub important: bool,
    pub labels: Vec<String>,
}

impl NormalizedMessage {
    /// Build from a `format=full` Gmail message resource.
    ///
    /// A message without a parsable id is rejected here; the caller drops
    /// it instead of storing a record with an empty id.
    pub fn from_gmail_message(msg: Message) -> anyhow::Result<Self> {
        let id = msg
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("message resource has no id, dropping"))?
            .to_string();

        let thread_id = msg.thread_id.clone().unwrap_or_default();
        let labels = msg.label_ids.clone().unwrap_or_default();
        let unread = labels.iter().any(|l| l == "UNREAD");
        let important = labels.iter().any(|l| l == "IMPORTANT");
        let snippet = msg.snippet.clone().unwrap_or_default();

        let subject = get_header(&msg, "Subject").unwrap_or_else(|| "No Subject".to_string());
        let from = clean_email_address(
            &get_header(&msg, "From").unwrap_or_else(|| "Unknown Sender".to_string()),
        );
        let to = clean_email_address(&get_header(&msg, "To").unwrap_or_default());
        let date = parse_date(get_header(&msg, "Date").as_deref(), msg.internal_date);

        let body = msg
            .payload
            .as_ref()
            .map(extract_body)
            .unwrap_or_default();
        let body = truncate_chars(body, BODY_CAP);

        Ok(NormalizedMessage {
            id,
            thread_id,
            subject,
            from,
            to,
            date,
            body,
            snippet,
            unread,
            important,
            labels,
        })
    }
}

/// Extract a header value from a Gmail API message payload
pub fn get_header(message: &Message, name: &str) -> Option<String> {
    message
        .payload
        .as_ref()?
        .headers
        .as_ref()?
        .iter()
        .find(|h| {
            h.name
                .as_deref()
                .map(|n| n.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
        .and_then(|h| h.value.clone())
}

/// Strip the `"Display Name <addr>"` wrapper, keeping the bare address.
pub fn clean_email_address(raw: &str) -> String {
    if let Some(caps) = RE_ANGLE_ADDR.captures(raw) {
        return caps[1].to_string();
    }
    raw.trim().to_string()
}

/// A message date is always representable: RFC 2822 `Date` header first,
/// then Gmail's `internalDate` millis, then the fetch time.
fn parse_date(header: Option<&str>, internal_date_ms: Option<i64>) -> DateTime<Utc> {
    if let Some(raw) = header {
        // Drop trailing zone comments like "(UTC)" that rfc2822 rejects
        let raw = raw.find(" (").map_or(raw, |idx| &raw[..idx]);
        if let Ok(parsed) = DateTime::parse_from_rfc2822(raw.trim()) {
            return parsed.with_timezone(&Utc);
        }
        tracing::debug!("Unparsable Date header: {:?}", header);
    }

    internal_date_ms
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

/// Body extraction policy: a single-part body is used as-is; multi-part
/// messages take the first `text/plain` part, falling back to the first
/// `text/html` part rendered to text. Plain text is never overridden by
/// html once found.
pub fn extract_body(payload: &MessagePart) -> String {
    if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_ref()) {
        if !data.is_empty() {
            return String::from_utf8_lossy(data).into_owned();
        }
    }

    let (text, html) = collect_part_bodies(payload);
    if let Some(text) = text {
        return text;
    }
    if let Some(html) = html {
        return strip_html(&html);
    }

    String::new()
}

/// Walk the part tree collecting the first plain-text and first html
/// bodies encountered, in document order.
fn collect_part_bodies(part: &MessagePart) -> (Option<String>, Option<String>) {
    let mut text = None;
    let mut html = None;

    if let Some(parts) = &part.parts {
        for sub_part in parts {
            let mime_type = sub_part.mime_type.as_deref().unwrap_or("");
            let data = sub_part
                .body
                .as_ref()
                .and_then(|b| b.data.as_ref())
                .map(|d| String::from_utf8_lossy(d).into_owned());

            match mime_type {
                "text/plain" => {
                    if text.is_none() {
                        text = data;
                    }
                }
                "text/html" => {
                    if html.is_none() {
                        html = data;
                    }
                }
                _ => {
                    let (t, h) = collect_part_bodies(sub_part);
                    if text.is_none() {
                        text = t;
                    }
                    if html.is_none() {
                        html = h;
                    }
                }
            }

            if text.is_some() && html.is_some() {
                break;
            }
        }
    }

    (text, html)
}

fn strip_html(html: &str) -> String {
    let text: String = html2text::from_read(html.as_bytes(), HTML_RENDER_WIDTH);
    let text = RE_WHITESPACE.replace_all(&text, " ");
    let text = RE_LONG_SPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Truncate to at most `cap` characters without splitting a code point.
pub fn truncate_chars(s: String, cap: usize) -> String {
    match s.char_indices().nth(cap) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s,
    }
}
