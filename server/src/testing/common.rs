use chrono::{TimeZone, Utc};

use crate::email::message::NormalizedMessage;

/// Hand-rolled message record for responder and routing tests.
pub fn normalized_message(
    id: &str,
    from: &str,
    subject: &str,
    unread: bool,
) -> NormalizedMessage {
    let mut labels = vec!["INBOX".to_string()];
    if unread {
        labels.push("UNREAD".to_string());
    }

    NormalizedMessage {
        id: id.to_string(),
        thread_id: format!("thread-{}", id),
        subject: subject.to_string(),
        from: from.to_string(),
        to: "me@example.com".to_string(),
        date: Utc.with_ymd_and_hms(2024, 8, 6, 9, 30, 0).unwrap(),
        body: format!("Body of {}", subject),
        snippet: format!("Snippet of {}", subject),
        unread,
        important: false,
        labels,
    }
}

pub fn unread_message(id: &str, from: &str, subject: &str) -> NormalizedMessage {
    normalized_message(id, from, subject, true)
}

pub fn read_message(id: &str, from: &str, subject: &str) -> NormalizedMessage {
    normalized_message(id, from, subject, false)
}
