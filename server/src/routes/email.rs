use axum::extract::{Path, Query, State};
use axum::Json;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::email::client::{EmailClient, DEFAULT_MAX_RESULTS};
use crate::email::message::NormalizedMessage;
use crate::error::AppJsonResult;
use crate::routes::bearer_token;
use crate::ServerState;

const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesQuery {
    /// Gmail search query; bare terms are widened across sender, subject
    /// and full text
    pub query: Option<String>,
    pub max_results: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesResponse {
    pub messages: Vec<NormalizedMessage>,
}

/// # GET /api/gmail/messages
pub async fn get_messages(
    State(state): State<ServerState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<GetMessagesQuery>,
) -> AppJsonResult<GetMessagesResponse> {
    let access_token = bearer_token(auth)?;
    let max_results = query
        .max_results
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .min(MAX_PAGE_SIZE);

    let client = EmailClient::new(state.http_client.clone(), access_token);
    let messages = client
        .list_messages(query.query.as_deref().unwrap_or_default(), max_results)
        .await?;

    Ok(Json(GetMessagesResponse { messages }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub success: bool,
    pub message_id: String,
}

/// # POST /api/gmail/messages
pub async fn send_message(
    State(state): State<ServerState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Json(req): Json<SendMessageRequest>,
) -> AppJsonResult<SendMessageResponse> {
    let access_token = bearer_token(auth)?;

    let client = EmailClient::new(state.http_client.clone(), access_token);
    let message_id = client.send_message(&req.to, &req.subject, &req.body).await?;

    Ok(Json(SendMessageResponse {
        success: true,
        message_id,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyMessageRequest {
    pub unread: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyMessageResponse {
    pub success: bool,
}

/// # POST /api/gmail/messages/:id/modify
///
/// Idempotent read/unread toggle; the change is only observable on the
/// next fetch.
pub async fn modify_message(
    State(state): State<ServerState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Path(message_id): Path<String>,
    Json(req): Json<ModifyMessageRequest>,
) -> AppJsonResult<ModifyMessageResponse> {
    let access_token = bearer_token(auth)?;

    let client = EmailClient::new(state.http_client.clone(), access_token);
    client.set_read_state(&message_id, req.unread).await?;

    Ok(Json(ModifyMessageResponse { success: true }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub count: u32,
}

/// # GET /api/gmail/unread
///
/// Advisory only; remote failures degrade to 0 rather than erroring.
pub async fn unread_count(
    State(state): State<ServerState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> AppJsonResult<UnreadCountResponse> {
    let access_token = bearer_token(auth)?;

    let client = EmailClient::new(state.http_client.clone(), access_token);
    let count = client.unread_count().await;

    Ok(Json(UnreadCountResponse { count }))
}
