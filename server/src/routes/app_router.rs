use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::{request_tracing, ServerState};

use super::{chat, email};

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        let origins = ["https://localhost:3000", "http://localhost:3000"]
            .into_iter()
            .map(|origin| origin.parse::<HeaderValue>().unwrap())
            .collect::<Vec<_>>();

        let cors_layer = CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true);

        Router::new()
            .route("/", get(|| async { "Inboxpilot server" }))
            .route("/api/ai/chat", post(chat::handler_chat))
            .nest(
                "/api/gmail",
                Router::new()
                    .route(
                        "/messages",
                        get(email::get_messages).post(email::send_message),
                    )
                    .route("/messages/:id/modify", post(email::modify_message))
                    .route("/unread", get(email::unread_count))
                    .with_state(state.clone()),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(request_tracing::make_span))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(cors_layer)
            .with_state(state)
            .fallback(handler_404)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
