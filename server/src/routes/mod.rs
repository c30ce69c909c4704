pub mod app_router;
pub mod chat;
pub mod email;

pub use app_router::AppRouter;

use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;

use crate::error::{AppError, AppResult};

/// Every mailbox route requires the caller-supplied bearer token; the
/// OAuth flow that produced it is out of scope.
pub(crate) fn bearer_token(
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> AppResult<String> {
    auth.map(|TypedHeader(auth)| auth.token().to_string())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized - Please sign in with Google".to_string()))
}
