use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use google_gmail1::api::{ListMessagesResponse, Message, Profile};
use leaky_bucket::RateLimiter;
use lib_email_clients::gmail::api_quota::{GMAIL_API_QUOTA, GMAIL_QUOTA_PER_SECOND};
use reqwest::StatusCode;
use serde_json::json;

use crate::email::message::NormalizedMessage;
use crate::email::outbound;
use crate::error::{AppError, AppResult};
use crate::HttpClient;

/// Gmail API error response structure
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GmailApiError {
    pub error: GmailApiErrorDetail,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GmailApiErrorDetail {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

macro_rules! gmail_url {
    ($($params:expr),*) => {
        {
            const GMAIL_ENDPOINT: &str = "https://www.googleapis.com/gmail/v1/users/me";
            let list_params = vec![$($params),*];
            let path = list_params.join("/");
            format!("{}/{}", GMAIL_ENDPOINT, path)
        }
    };
}

/// Detail fetches per concurrent window inside `list_messages`
const DETAIL_BATCH_SIZE: usize = 10;
/// Pacing delay between windows, pure rate-limit mitigation
const INTER_BATCH_DELAY: Duration = Duration::from_millis(100);

pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Client for one user's mailbox. Holds the caller-supplied bearer token
/// for the duration of a request; constructs no shared state besides the
/// quota bucket.
#[derive(Debug, Clone)]
pub struct EmailClient {
    http_client: HttpClient,
    access_token: String,
    rate_limiter: Arc<RateLimiter>,
}

impl EmailClient {
    pub fn new(http_client: HttpClient, access_token: String) -> EmailClient {
        let rate_limiter = Arc::new(
            RateLimiter::builder()
                .initial(GMAIL_QUOTA_PER_SECOND)
                .interval(Duration::from_secs(1))
                .refill(GMAIL_QUOTA_PER_SECOND)
                .build(),
        );

        EmailClient {
            http_client,
            access_token,
            rate_limiter,
        }
    }

    /// List messages matching `search_query`, newest first, normalized.
    ///
    /// Bare search terms are widened across sender, subject and full text;
    /// structured queries pass through unchanged. Message details are
    /// fetched in fixed concurrent windows; a message that fails to fetch
    /// or parse is logged and skipped, never fatal to the page.
    pub async fn list_messages(
        &self,
        search_query: &str,
        max_results: u32,
    ) -> AppResult<Vec<NormalizedMessage>> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_list)
            .await;

        let query = widen_search_query(search_query);
        tracing::debug!("Fetching messages with query: {:?}", query);

        let query_params = vec![
            ("q".to_string(), query),
            ("maxResults".to_string(), max_results.to_string()),
        ];
        let resp = self
            .http_client
            .get(gmail_url!("messages"))
            .query(&query_params)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let resp = check_gmail_response(resp).await?;

        let data = resp
            .json::<ListMessagesResponse>()
            .await
            .map_err(|e| AppError::Mailbox(e.into()))?;

        let ids = data
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect::<Vec<_>>();

        if ids.is_empty() {
            tracing::debug!("No messages found");
            return Ok(Vec::new());
        }

        let mut messages = Vec::with_capacity(ids.len());
        let chunks = ids.chunks(DETAIL_BATCH_SIZE).collect::<Vec<_>>();
        let last_chunk = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.into_iter().enumerate() {
            for _ in 0..chunk.len() {
                self.rate_limiter.acquire(GMAIL_API_QUOTA.messages_get).await;
            }

            // Fan out the window, join it, drop the failures
            let batch = join_all(chunk.iter().map(|id| self.fetch_normalized(id))).await;
            messages.extend(batch.into_iter().flatten());

            if i < last_chunk {
                tokio::time::sleep(INTER_BATCH_DELAY).await;
            }
        }

        tracing::debug!("Successfully processed {} messages", messages.len());
        Ok(messages)
    }

    /// One detail fetch; failures are absorbed into `None` so a bad
    /// message cannot fail the whole page.
    async fn fetch_normalized(&self, message_id: &str) -> Option<NormalizedMessage> {
        match self.get_message_by_id(message_id).await {
            Ok(message) => match NormalizedMessage::from_gmail_message(message) {
                Ok(normalized) => Some(normalized),
                Err(e) => {
                    tracing::warn!("Skipping unparsable message {}: {}", message_id, e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Error fetching message {}: {}", message_id, e);
                None
            }
        }
    }

    pub async fn get_message_by_id(&self, message_id: &str) -> AppResult<Message> {
        let resp = self
            .http_client
            .get(gmail_url!("messages", message_id))
            .query(&[("format", "FULL")])
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let resp = check_gmail_response(resp).await?;

        resp.json::<Message>()
            .await
            .map_err(|e| AppError::Mailbox(e.into()))
    }

    /// Send a plain-text message, returning the remote-assigned id.
    pub async fn send_message(&self, to: &str, subject: &str, body: &str) -> AppResult<String> {
        let profile = self
            .get_profile()
            .await
            .map_err(|e| AppError::SendFailure(format!("could not resolve sender: {}", e)))?;
        let from = profile
            .email_address
            .ok_or_else(|| AppError::SendFailure("profile has no email address".to_string()))?;

        let raw = outbound::build_raw_message(&from, to, subject, body)?;

        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_send)
            .await;

        let resp = self
            .http_client
            .post(gmail_url!("messages", "send"))
            .bearer_auth(&self.access_token)
            .json(&json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| AppError::SendFailure(e.to_string()))?;

        let data = resp
            .json::<serde_json::Value>()
            .await
            .map_err(|e| AppError::SendFailure(e.to_string()))?;

        let id = parse_send_response(data)?;
        tracing::info!("Email sent successfully: {}", id);
        Ok(id)
    }

    /// Idempotent UNREAD label mutation.
    pub async fn set_read_state(&self, message_id: &str, unread: bool) -> AppResult<()> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_modify)
            .await;

        let body = if unread {
            json!({ "addLabelIds": ["UNREAD"], "removeLabelIds": [] })
        } else {
            json!({ "addLabelIds": [], "removeLabelIds": ["UNREAD"] })
        };

        let resp = self
            .http_client
            .post(gmail_url!("messages", message_id, "modify"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        check_gmail_response(resp).await?;

        tracing::debug!("Marked message {} unread={}", message_id, unread);
        Ok(())
    }

    /// Advisory unread total; any failure collapses to 0.
    pub async fn unread_count(&self) -> u32 {
        match self.try_unread_count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Error getting unread count: {}", e);
                0
            }
        }
    }

    async fn try_unread_count(&self) -> AppResult<u32> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_list)
            .await;

        let resp = self
            .http_client
            .get(gmail_url!("messages"))
            .query(&[("q", "is:unread"), ("maxResults", "1")])
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let resp = check_gmail_response(resp).await?;

        let data = resp
            .json::<ListMessagesResponse>()
            .await
            .map_err(|e| AppError::Mailbox(e.into()))?;

        Ok(data.result_size_estimate.unwrap_or(0))
    }

    pub async fn get_profile(&self) -> AppResult<Profile> {
        self.rate_limiter.acquire(GMAIL_API_QUOTA.get_profile).await;

        let resp = self
            .http_client
            .get(gmail_url!("profile"))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let resp = check_gmail_response(resp).await?;

        resp.json::<Profile>()
            .await
            .map_err(|e| AppError::Mailbox(e.into()))
    }
}

/// Widen a bare search term into an OR across sender, subject and full
/// text so single-word queries still match; structured queries are the
/// user's business and pass through untouched.
pub fn widen_search_query(search_query: &str) -> String {
    let query = search_query.trim();
    if query.is_empty() {
        return String::new();
    }

    let has_operator = ["from:", "to:", "subject:"]
        .iter()
        .any(|op| query.contains(op));
    if has_operator {
        return query.to_string();
    }

    format!("(from:{q} OR subject:{q} OR {q})", q = query)
}

/// Extract the remote-assigned id from a `messages.send` response body; a
/// remote rejection becomes a `SendFailure` carrying the upstream reason.
fn parse_send_response(data: serde_json::Value) -> AppResult<String> {
    if let Some(error) = data.get("error") {
        let reason = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(AppError::SendFailure(reason.to_string()));
    }

    data.get("id")
        .and_then(|id| id.as_str())
        .map(|id| id.to_string())
        .ok_or_else(|| AppError::SendFailure("send response has no message id".to_string()))
}

/// Map a non-success Gmail response onto the mailbox error taxonomy.
async fn check_gmail_response(resp: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let detail = resp
        .json::<GmailApiError>()
        .await
        .map(|e| e.error.message)
        .unwrap_or_else(|_| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED => AppError::AuthExpired,
        StatusCode::FORBIDDEN => AppError::AccessDenied,
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited,
        _ => AppError::Mailbox(anyhow::anyhow!(
            "Gmail API error (code {}): {}",
            status.as_u16(),
            detail
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gmail_url() {
        let url = gmail_url!("messages");
        assert_eq!(url, "https://www.googleapis.com/gmail/v1/users/me/messages");
        let url = gmail_url!("messages", "123", "modify");
        assert_eq!(
            url,
            "https://www.googleapis.com/gmail/v1/users/me/messages/123/modify"
        );
    }

    #[test]
    fn test_widen_bare_search_term() {
        assert_eq!(
            widen_search_query("mobbin"),
            "(from:mobbin OR subject:mobbin OR mobbin)"
        );
    }

    #[test]
    fn test_structured_queries_pass_through() {
        assert_eq!(widen_search_query("from:billing@mobbin.com"), "from:billing@mobbin.com");
        assert_eq!(widen_search_query("subject:invoice"), "subject:invoice");
        assert_eq!(widen_search_query("to:me@example.com"), "to:me@example.com");
    }

    #[test]
    fn test_empty_query_stays_empty() {
        assert_eq!(widen_search_query(""), "");
        assert_eq!(widen_search_query("   "), "");
    }

    #[test]
    fn test_parse_send_response_id() {
        let id = parse_send_response(json!({ "id": "abc", "threadId": "t1" })).unwrap();
        assert_eq!(id, "abc");
    }

    #[test]
    fn test_parse_send_response_error_is_send_failure() {
        let err = parse_send_response(json!({
            "error": { "code": 400, "message": "Invalid To header" }
        }))
        .unwrap_err();
        match err {
            AppError::SendFailure(reason) => assert_eq!(reason, "Invalid To header"),
            other => panic!("expected SendFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_send_response_missing_id() {
        assert!(matches!(
            parse_send_response(json!({})),
            Err(AppError::SendFailure(_))
        ));
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_list_messages_live() {
        let token = std::env::var("GMAIL_ACCESS_TOKEN").expect("GMAIL_ACCESS_TOKEN is required");
        let client = EmailClient::new(reqwest::Client::new(), token);

        let messages = client.list_messages("", 5).await.unwrap();
        for message in &messages {
            assert!(!message.id.is_empty());
        }
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_set_read_state_is_idempotent() {
        let token = std::env::var("GMAIL_ACCESS_TOKEN").expect("GMAIL_ACCESS_TOKEN is required");
        let message_id = std::env::var("GMAIL_TEST_MESSAGE_ID").expect("message id required");
        let client = EmailClient::new(reqwest::Client::new(), token);

        client.set_read_state(&message_id, false).await.unwrap();
        client.set_read_state(&message_id, false).await.unwrap();

        let message = client.get_message_by_id(&message_id).await.unwrap();
        let labels = message.label_ids.unwrap_or_default();
        assert!(!labels.iter().any(|l| l == "UNREAD"));
    }
}
