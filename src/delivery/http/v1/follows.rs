use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use crate::delivery::http::v1::middleware::AuthenticatedUser;
use crate::usecase::error::UsecaseError;

#[derive(Serialize)]
pub struct FollowStatusResponse {
    pub following: bool,
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id, %followee_id))]
pub async fn follow_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(followee_id): Path<Uuid>,
) -> Result<impl IntoResponse, UsecaseError> {
    let edge = state.follows_usecase.follow(user.user_id, followee_id).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id, %followee_id))]
pub async fn unfollow_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(followee_id): Path<Uuid>,
) -> Result<impl IntoResponse, UsecaseError> {
    state.follows_usecase.unfollow(user.user_id, followee_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id, %followee_id))]
pub async fn follow_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(followee_id): Path<Uuid>,
) -> Result<impl IntoResponse, UsecaseError> {
    let following = state
        .follows_usecase
        .is_following(user.user_id, followee_id)
        .await?;
    Ok((StatusCode::OK, Json(FollowStatusResponse { following })))
}
