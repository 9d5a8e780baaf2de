use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::AppState;
use crate::usecase::activities::Caller;

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}

impl From<&AuthenticatedUser> for Caller {
    fn from(user: &AuthenticatedUser) -> Self {
        Caller::new(user.user_id, user.role.clone())
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let Some(token) = bearer_token(&request) else {
        tracing::warn!("missing or invalid authorization header");
        return Err((
            StatusCode::UNAUTHORIZED,
            "Missing or invalid Authorization header".to_string(),
        ));
    };

    let identity = state.token_verifier.verify_access(token).map_err(|e| {
        tracing::warn!(error = %e, "rejected access token");
        (StatusCode::UNAUTHORIZED, format!("Invalid token: {e}"))
    })?;

    let authenticated_user = AuthenticatedUser {
        user_id: identity.user_id,
        email: identity.email,
        role: identity.role,
    };

    tracing::debug!(?authenticated_user, "user authenticated successfully");
    request.extensions_mut().insert(authenticated_user);

    Ok(next.run(request).await)
}
