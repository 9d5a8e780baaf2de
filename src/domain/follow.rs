use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FollowError {
    #[error("users cannot follow themselves")]
    SelfFollow,
}

/// Directed edge: `follower_id` receives `followee_id`'s activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
    pub follower_id: Uuid,
    pub followee_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl FollowEdge {
    pub fn new(follower_id: Uuid, followee_id: Uuid) -> Result<Self, FollowError> {
        if follower_id == followee_id {
            return Err(FollowError::SelfFollow);
        }
        Ok(Self {
            follower_id,
            followee_id,
            created_at: Utc::now().trunc_subsecs(6),
        })
    }
}
