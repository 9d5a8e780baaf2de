use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::delivery::http::v1::middleware::AuthenticatedUser;
use crate::domain::activity::{ActivityType, Metadata, TargetType};
use crate::usecase::activities::Caller;
use crate::usecase::error::UsecaseError;

const MAX_METADATA_KEYS: usize = 32;

#[derive(Debug, Deserialize, Validate)]
pub struct RecordActivityRequest {
    pub activity_type: ActivityType,
    pub target_type: TargetType,
    pub target_id: Uuid,
    #[serde(default)]
    #[validate(custom(function = "validate_metadata"))]
    pub metadata: Metadata,
    /// Owner of the target (spot owner, session organizer), notified directly.
    /// Accepted from admin and service callers only.
    pub owner_id: Option<Uuid>,
}

fn validate_metadata(metadata: &Metadata) -> Result<(), ValidationError> {
    if metadata.len() > MAX_METADATA_KEYS {
        return Err(ValidationError::new("too_many_metadata_keys"));
    }
    Ok(())
}

#[tracing::instrument(skip(state, payload), fields(user_id = %user.user_id))]
pub async fn record_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(payload): Json<RecordActivityRequest>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!(activity_type = %payload.activity_type, "handling record activity request");

    if let Err(validation_errors) = payload.validate() {
        tracing::warn!(user_id = %user.user_id, ?validation_errors, "validation failed");
        return Err(UsecaseError::Validation(format!("{:?}", validation_errors)));
    }

    let recorded = state
        .activity_recorder
        .record_with_owner(
            &Caller::from(&user),
            payload.activity_type,
            payload.target_type,
            payload.target_id,
            payload.metadata,
            payload.owner_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(recorded)))
}

#[tracing::instrument(skip(state), fields(user_id = %user.user_id, %target_type, %target_id))]
pub async fn purge_target(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((target_type, target_id)): Path<(TargetType, Uuid)>,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling purge target request");

    let summary = state
        .activity_recorder
        .purge_target(&Caller::from(&user), target_type, target_id)
        .await?;

    Ok((StatusCode::OK, Json(summary)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_parses_snake_case_types() {
        let request: RecordActivityRequest = serde_json::from_value(json!({
            "activity_type": "rating_given",
            "target_type": "rating",
            "target_id": Uuid::new_v4(),
            "metadata": {"spot_name": "Pier 7", "score": 5}
        }))
        .unwrap();

        assert_eq!(request.activity_type, ActivityType::RatingGiven);
        assert_eq!(request.target_type, TargetType::Rating);
        assert_eq!(request.owner_id, None);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_unknown_activity_type_is_rejected_by_serde() {
        let result = serde_json::from_value::<RecordActivityRequest>(json!({
            "activity_type": "route_created",
            "target_type": "spot",
            "target_id": Uuid::new_v4()
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_metadata_fails_validation() {
        let metadata: Metadata = (0..=MAX_METADATA_KEYS)
            .map(|i| (format!("key_{i}"), json!(i)))
            .collect();
        let request = RecordActivityRequest {
            activity_type: ActivityType::SpotCreated,
            target_type: TargetType::Spot,
            target_id: Uuid::new_v4(),
            metadata,
            owner_id: None,
        };

        assert!(request.validate().is_err());
    }
}
