use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::activity::{Activity, ActivityType, TargetType};
use crate::domain::feed::Cursor;
use crate::domain::follow::FollowEdge;
use crate::domain::notification::{Notification, NotificationWithActivity};
use crate::domain::profile::ActorProfile;
use crate::repository::errors::RepositoryError;
use crate::usecase::fanout::FanoutOutcome;

/// Range-and-type filter over the activity log. Results are ordered
/// newest first by (created_at, id).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityQuery {
    pub actor_id: Option<Uuid>,
    /// Empty means any type.
    pub activity_types: Vec<ActivityType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub before: Option<Cursor>,
    pub limit: i64,
}

impl ActivityQuery {
    pub fn matches(&self, activity: &Activity) -> bool {
        self.actor_id.is_none_or(|actor| activity.actor_id == actor)
            && (self.activity_types.is_empty() || self.activity_types.contains(&activity.activity_type))
            && self.since.is_none_or(|since| activity.created_at >= since)
            && self.until.is_none_or(|until| activity.created_at < until)
            && self
                .before
                .is_none_or(|cursor| cursor.precedes(activity.created_at, activity.id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub activities_deleted: u64,
    pub notifications_deleted: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowerPage {
    pub follower_ids: Vec<Uuid>,
    /// Pass back as `after` to continue; `None` once the last page was served.
    pub next_cursor: Option<Uuid>,
}

/// Append-only activity log.
#[cfg_attr(test, mockall::automock)]
pub trait ActivityRepository: Send + Sync {
    async fn append(&self, activity: &Activity) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Activity>, RepositoryError>;
    async fn query(&self, query: &ActivityQuery) -> Result<Vec<Activity>, RepositoryError>;
    /// Removes the target's activities and every notification pointing at them, atomically.
    async fn delete_for_target(
        &self,
        target_type: TargetType,
        target_id: Uuid,
    ) -> Result<PurgeSummary, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait NotificationRepository: Send + Sync {
    /// Inserts the batch, skipping rows that collide on (recipient_id, activity_id).
    /// Returns the number of rows actually written.
    async fn insert_batch(&self, notifications: &[Notification]) -> Result<u64, RepositoryError>;
    /// Newest first. `unread_only` drops notifications already read.
    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        before: Option<Cursor>,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<NotificationWithActivity>, RepositoryError>;
    async fn count_unread(&self, recipient_id: Uuid) -> Result<i64, RepositoryError>;
    async fn mark_as_read(&self, id: Uuid, recipient_id: Uuid) -> Result<(), RepositoryError>;
    async fn mark_all_as_read(&self, recipient_id: Uuid) -> Result<u64, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait FollowRepository: Send + Sync {
    /// `false` when the edge already existed.
    async fn follow(&self, edge: &FollowEdge) -> Result<bool, RepositoryError>;
    /// `false` when there was no edge to remove.
    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, RepositoryError>;
    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, RepositoryError>;
    async fn list_followers(
        &self,
        followee_id: Uuid,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<FollowerPage, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait ProfileRepository: Send + Sync {
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ActorProfile>, RepositoryError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<ActorProfile>, RepositoryError>;
}

/// Hands a freshly persisted activity to fan-out, inline or through a queue.
#[cfg_attr(test, mockall::automock)]
pub trait FanoutDispatcher: Send + Sync {
    async fn dispatch(&self, activity: &Activity, owner_id: Option<Uuid>) -> FanoutOutcome;
}
