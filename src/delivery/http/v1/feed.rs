use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use crate::delivery::http::v1::middleware::AuthenticatedUser;
use crate::domain::activity::ActivityType;
use crate::usecase::error::UsecaseError;
use crate::usecase::feed::{ActivityFilter, DEFAULT_LIMIT, MAX_LIMIT};

#[derive(Debug, Default, Deserialize, Validate)]
pub struct FeedParams {
    #[validate(length(max = 256))]
    pub cursor: Option<String>,
    #[validate(range(min = 1, max = MAX_LIMIT))]
    pub limit: Option<i64>,
    /// Comma-separated activity types, e.g. `rating_given,comment_posted`.
    #[validate(length(max = 256))]
    pub types: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, PartialEq)]
struct PageRequest {
    cursor: Option<String>,
    limit: i64,
    filter: ActivityFilter,
    unread_only: bool,
}

impl FeedParams {
    fn checked(self) -> Result<PageRequest, UsecaseError> {
        if let Err(validation_errors) = self.validate() {
            tracing::warn!(?validation_errors, "validation failed");
            return Err(UsecaseError::Validation(format!("{:?}", validation_errors)));
        }

        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since >= until {
                return Err(UsecaseError::Validation("since must be before until".to_string()));
            }
        }

        let activity_types = self
            .types
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| t.parse::<ActivityType>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| UsecaseError::Validation(e.to_string()))?;

        Ok(PageRequest {
            cursor: self.cursor,
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
            filter: ActivityFilter {
                activity_types,
                since: self.since,
                until: self.until,
            },
            unread_only: self.unread_only,
        })
    }
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn personal_feed(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<FeedParams>,
) -> Result<impl IntoResponse, UsecaseError> {
    let request = params.checked()?;

    let page = state
        .feed_service
        .get_personal_feed(
            user.user_id,
            request.unread_only,
            request.cursor.as_deref(),
            request.limit,
        )
        .await?;

    Ok((StatusCode::OK, Json(page)))
}

#[tracing::instrument(skip(state))]
pub async fn public_feed(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedParams>,
) -> Result<impl IntoResponse, UsecaseError> {
    let request = params.checked()?;

    let page = state
        .feed_service
        .get_public_feed(&request.filter, request.cursor.as_deref(), request.limit)
        .await?;

    Ok((StatusCode::OK, Json(page)))
}

#[tracing::instrument(skip(state))]
pub async fn user_activity(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Query(params): Query<FeedParams>,
) -> Result<impl IntoResponse, UsecaseError> {
    let request = params.checked()?;

    let page = state
        .feed_service
        .get_user_activity(
            &username,
            &request.filter,
            request.cursor.as_deref(),
            request.limit,
        )
        .await?;

    Ok((StatusCode::OK, Json(page)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_defaults_to_twenty() {
        let request = FeedParams::default().checked().unwrap();
        assert_eq!(request.cursor, None);
        assert_eq!(request.limit, 20);
        assert_eq!(request.filter, ActivityFilter::default());
        assert!(!request.unread_only);
    }

    #[test]
    fn test_limit_out_of_range_is_rejected() {
        for limit in [0, 101, -1] {
            let params = FeedParams {
                limit: Some(limit),
                ..Default::default()
            };
            assert!(matches!(params.checked(), Err(UsecaseError::Validation(_))));
        }
    }

    #[test]
    fn test_cursor_passes_through_undecoded() {
        let params = FeedParams {
            cursor: Some("opaque".to_string()),
            limit: Some(100),
            ..Default::default()
        };
        let request = params.checked().unwrap();
        assert_eq!(request.cursor.as_deref(), Some("opaque"));
        assert_eq!(request.limit, 100);
    }

    #[test]
    fn test_query_string_parses_filters() {
        let Query(params): Query<FeedParams> = Query::try_from_uri(
            &"/api/v1/feed?types=rating_given,%20comment_posted&since=2024-05-01T00:00:00Z&unread_only=true"
                .parse()
                .unwrap(),
        )
        .unwrap();

        let request = params.checked().unwrap();
        assert_eq!(
            request.filter.activity_types,
            vec![ActivityType::RatingGiven, ActivityType::CommentPosted]
        );
        assert!(request.filter.since.is_some());
        assert_eq!(request.filter.until, None);
        assert!(request.unread_only);
    }

    #[test]
    fn test_unknown_type_and_inverted_range_are_rejected() {
        let params = FeedParams {
            types: Some("route_created".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.checked(), Err(UsecaseError::Validation(_))));

        let now = Utc::now();
        let params = FeedParams {
            since: Some(now),
            until: Some(now),
            ..Default::default()
        };
        assert!(matches!(params.checked(), Err(UsecaseError::Validation(_))));
    }
}
