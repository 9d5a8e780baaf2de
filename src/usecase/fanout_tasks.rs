use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::activity::Activity;

pub const FANOUT_STREAM: &str = "FEED_FANOUT";
pub const FANOUT_SUBJECT: &str = "feed.fanout";
pub const FANOUT_CONSUMER: &str = "feed-fanout-worker";

/// Queue message asking a worker to fan out an already persisted activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutTask {
    pub activity_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
}

impl FanoutTask {
    pub fn for_activity(activity: &Activity, owner_id: Option<Uuid>) -> Self {
        Self {
            activity_id: activity.id,
            owner_id: owner_id.filter(|owner| *owner != activity.actor_id),
        }
    }
}
