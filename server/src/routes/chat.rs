use std::str::FromStr;

use axum::extract::State;
use axum::Json;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assistant::gemini::GenerativeClient;
use crate::assistant::intent::{Action, Instruction, Strategy};
use crate::assistant::{intent, responder, Assistant};
use crate::email::client::EmailClient;
use crate::email::message::NormalizedMessage;
use crate::error::{AppError, AppJsonResult};
use crate::routes::bearer_token;
use crate::server_config::cfg;
use crate::ServerState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub action: Option<String>,
    pub email_id: Option<String>,
    // Populated only for the send_email action
    pub to: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
    pub unread: bool,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetadata {
    pub total_emails: usize,
    pub unread_count: usize,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub email_context: Vec<EmailSummary>,
    pub metadata: ChatMetadata,
}

/// # POST /api/ai/chat
///
/// One instruction in, one response out. Mailbox failures surface as
/// typed errors; generative failures never do.
pub async fn handler_chat(
    State(state): State<ServerState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Json(req): Json<ChatRequest>,
) -> AppJsonResult<ChatResponse> {
    let access_token = bearer_token(auth)?;

    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message is required".to_string()));
    }

    let action = req.action.as_deref().and_then(|a| {
        Action::from_str(a)
            .map_err(|_| tracing::debug!("Unknown action tag {:?}, defaulting to analyze", a))
            .ok()
    });

    let instruction = Instruction {
        text: message.clone(),
        action,
        target_message_id: req.email_id.clone(),
    };

    tracing::info!(
        "Processing chat request: action={:?} message={:?}",
        action,
        message.chars().take(100).collect::<String>()
    );

    let email_client = EmailClient::new(state.http_client.clone(), access_token);
    let assistant = Assistant::new(
        GenerativeClient::new(state.http_client.clone())?,
        state.rate_limiters.clone(),
    );

    // Fetch deeper when the instruction asks for everything
    let message_lower = message.to_lowercase();
    let max_results = if message_lower.contains("all") || message_lower.contains("search") {
        cfg.settings.expanded_context_messages
    } else {
        cfg.settings.context_messages
    };

    let emails = email_client.list_messages("", max_results).await?;
    tracing::debug!("Fetched {} emails for analysis", emails.len());

    let response = match intent::route(&instruction, assistant.known_senders()) {
        Strategy::SenderLookup { token } => {
            responder::search_specific_sender(&responder::email_context(&emails), &token)
        }
        Strategy::Compose => assistant.compose(&message).await,
        Strategy::SendEmail => {
            send_requested_email(&email_client, &req).await?
        }
        Strategy::DraftResponse => match &instruction.target_message_id {
            None => "Please specify which email you'd like me to draft a response to.".to_string(),
            Some(email_id) => match emails.iter().find(|e| &e.id == email_id) {
                Some(email) => assistant.draft_response(email, &message).await,
                None => "I couldn't find that email to respond to. Please try again.".to_string(),
            },
        },
        Strategy::Analyze => assistant.analyze(&emails, &message).await,
    };

    let email_context = build_email_summaries(&emails, cfg.settings.display_messages);
    let metadata = ChatMetadata {
        total_emails: emails.len(),
        unread_count: emails.iter().filter(|e| e.unread).count(),
        processed_at: Utc::now(),
    };

    Ok(Json(ChatResponse {
        response,
        email_context,
        metadata,
    }))
}

/// Sending is an explicit user-requested side effect: a rejected send is
/// reported in the response text, never silently swallowed. Other mailbox
/// failures keep their typed propagation.
async fn send_requested_email(email_client: &EmailClient, req: &ChatRequest) -> Result<String, AppError> {
    let (to, subject, body) = match (&req.to, &req.subject, &req.body) {
        (Some(to), Some(subject), Some(body))
            if !to.is_empty() && !subject.is_empty() && !body.is_empty() =>
        {
            (to, subject, body)
        }
        _ => {
            return Ok(
                "Please provide recipient (to), subject, and body to send an email.".to_string(),
            )
        }
    };

    match email_client.send_message(to, subject, body).await {
        Ok(_) => Ok(format!("✅ Email sent successfully to {}!", to)),
        Err(AppError::SendFailure(reason)) => {
            tracing::error!("Error sending email: {}", reason);
            Ok(format!("❌ Failed to send email: {}", reason))
        }
        Err(other) => Err(other),
    }
}

fn build_email_summaries(emails: &[NormalizedMessage], limit: usize) -> Vec<EmailSummary> {
    emails
        .iter()
        .take(limit)
        .map(|e| EmailSummary {
            id: e.id.clone(),
            from: e.from.clone(),
            subject: e.subject.clone(),
            snippet: e.snippet.clone(),
            unread: e.unread,
            date: e.date,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::common::{read_message, unread_message};

    #[test]
    fn test_summaries_trimmed_to_display_limit() {
        let emails = (0..15)
            .map(|i| read_message(&i.to_string(), "a@x.com", "Subject"))
            .collect::<Vec<_>>();

        let summaries = build_email_summaries(&emails, 10);
        assert_eq!(summaries.len(), 10);
        assert_eq!(summaries[0].id, "0");
        assert_eq!(summaries[9].id, "9");
    }

    #[test]
    fn test_summaries_keep_read_state_and_order() {
        let emails = vec![
            unread_message("1", "a@x.com", "One"),
            read_message("2", "b@x.com", "Two"),
        ];
        let summaries = build_email_summaries(&emails, 10);
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].unread);
        assert!(!summaries[1].unread);
    }
}
