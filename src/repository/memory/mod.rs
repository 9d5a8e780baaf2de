use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::activity::{Activity, TargetType};
use crate::domain::feed::Cursor;
use crate::domain::follow::FollowEdge;
use crate::domain::notification::{Notification, NotificationWithActivity};
use crate::domain::profile::ActorProfile;
use crate::repository::errors::RepositoryError;
use crate::usecase::contracts::{
    ActivityQuery, ActivityRepository, FollowRepository, FollowerPage, NotificationRepository,
    ProfileRepository, PurgeSummary,
};

#[derive(Default)]
struct State {
    activities: HashMap<Uuid, Activity>,
    notifications: HashMap<Uuid, Notification>,
    /// (recipient_id, activity_id) -> notification id
    notification_keys: HashMap<(Uuid, Uuid), Uuid>,
    /// keyed (followee_id, follower_id) so a followee's followers are a contiguous range
    follows: BTreeMap<(Uuid, Uuid), FollowEdge>,
    profiles: HashMap<Uuid, ActorProfile>,
    batch_sizes: Vec<usize>,
    profile_lookups: usize,
}

/// Process-local store implementing every storage contract. Each instance
/// owns its state; clones share it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reset(&self) {
        *self.state.write().await = State::default();
    }

    pub async fn add_profile(&self, profile: ActorProfile) {
        self.state.write().await.profiles.insert(profile.id, profile);
    }

    pub async fn notification_count(&self) -> usize {
        self.state.read().await.notifications.len()
    }

    pub async fn activity_count(&self) -> usize {
        self.state.read().await.activities.len()
    }

    /// Sizes of every `insert_batch` call, in call order.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.state.read().await.batch_sizes.clone()
    }

    pub async fn profile_lookups(&self) -> usize {
        self.state.read().await.profile_lookups
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> Cursor) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

impl ActivityRepository for MemoryStore {
    async fn append(&self, activity: &Activity) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.activities.contains_key(&activity.id) {
            return Err(RepositoryError::DatabaseError(format!(
                "duplicate activity id {}",
                activity.id
            )));
        }
        state.activities.insert(activity.id, activity.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Activity>, RepositoryError> {
        Ok(self.state.read().await.activities.get(&id).cloned())
    }

    async fn query(&self, query: &ActivityQuery) -> Result<Vec<Activity>, RepositoryError> {
        let state = self.state.read().await;
        let mut found: Vec<Activity> = state
            .activities
            .values()
            .filter(|activity| query.matches(activity))
            .cloned()
            .collect();
        newest_first(&mut found, |a| Cursor::new(a.created_at, a.id));
        found.truncate(query.limit.max(0) as usize);
        Ok(found)
    }

    async fn delete_for_target(
        &self,
        target_type: TargetType,
        target_id: Uuid,
    ) -> Result<PurgeSummary, RepositoryError> {
        let mut state = self.state.write().await;
        let doomed: Vec<Uuid> = state
            .activities
            .values()
            .filter(|a| a.target_type == target_type && a.target_id == target_id)
            .map(|a| a.id)
            .collect();

        let before = state.notifications.len();
        state
            .notifications
            .retain(|_, n| !doomed.contains(&n.activity_id));
        state
            .notification_keys
            .retain(|(_, activity_id), _| !doomed.contains(activity_id));
        let notifications_deleted = (before - state.notifications.len()) as u64;

        for id in &doomed {
            state.activities.remove(id);
        }

        Ok(PurgeSummary {
            activities_deleted: doomed.len() as u64,
            notifications_deleted,
        })
    }
}

impl NotificationRepository for MemoryStore {
    async fn insert_batch(&self, notifications: &[Notification]) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        state.batch_sizes.push(notifications.len());

        if let Some(orphan) = notifications
            .iter()
            .find(|n| !state.activities.contains_key(&n.activity_id))
        {
            return Err(RepositoryError::DatabaseError(format!(
                "activity {} does not exist",
                orphan.activity_id
            )));
        }

        let mut inserted = 0;
        for notification in notifications {
            let key = (notification.recipient_id, notification.activity_id);
            if state.notification_keys.contains_key(&key) {
                continue;
            }
            state.notification_keys.insert(key, notification.id);
            state
                .notifications
                .insert(notification.id, notification.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        before: Option<Cursor>,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<NotificationWithActivity>, RepositoryError> {
        let state = self.state.read().await;
        let mut found: Vec<NotificationWithActivity> = state
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .filter(|n| !unread_only || !n.is_read)
            .filter(|n| before.is_none_or(|c| c.precedes(n.created_at, n.id)))
            .filter_map(|n| {
                state
                    .activities
                    .get(&n.activity_id)
                    .map(|activity| NotificationWithActivity {
                        notification: n.clone(),
                        activity: activity.clone(),
                    })
            })
            .collect();
        newest_first(&mut found, |row| {
            Cursor::new(row.notification.created_at, row.notification.id)
        });
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn count_unread(&self, recipient_id: Uuid) -> Result<i64, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
            .count() as i64)
    }

    async fn mark_as_read(&self, id: Uuid, recipient_id: Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        match state.notifications.get_mut(&id) {
            Some(n) if n.recipient_id == recipient_id => {
                n.mark_read(Utc::now());
                Ok(())
            }
            _ => Err(RepositoryError::NotFound),
        }
    }

    async fn mark_all_as_read(&self, recipient_id: Uuid) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let updated = state
            .notifications
            .values_mut()
            .filter(|n| n.recipient_id == recipient_id)
            .filter(|n| !n.is_read)
            .map(|n| n.mark_read(now))
            .count();
        Ok(updated as u64)
    }
}

impl FollowRepository for MemoryStore {
    async fn follow(&self, edge: &FollowEdge) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let key = (edge.followee_id, edge.follower_id);
        if state.follows.contains_key(&key) {
            return Ok(false);
        }
        state.follows.insert(key, edge.clone());
        Ok(true)
    }

    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        Ok(state.follows.remove(&(followee_id, follower_id)).is_some())
    }

    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.follows.contains_key(&(followee_id, follower_id)))
    }

    async fn list_followers(
        &self,
        followee_id: Uuid,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<FollowerPage, RepositoryError> {
        let state = self.state.read().await;
        let limit = limit.max(1) as usize;
        // one extra row tells whether another page exists
        let mut follower_ids: Vec<Uuid> = state
            .follows
            .range((followee_id, Uuid::nil())..=(followee_id, Uuid::from_u128(u128::MAX)))
            .map(|((_, follower_id), _)| *follower_id)
            .filter(|id| after.is_none_or(|after| *id > after))
            .take(limit + 1)
            .collect();

        let next_cursor = if follower_ids.len() > limit {
            follower_ids.truncate(limit);
            follower_ids.last().copied()
        } else {
            None
        };
        Ok(FollowerPage {
            follower_ids,
            next_cursor,
        })
    }
}

impl ProfileRepository for MemoryStore {
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ActorProfile>, RepositoryError> {
        let mut state = self.state.write().await;
        state.profile_lookups += 1;
        Ok(ids
            .iter()
            .filter_map(|id| state.profiles.get(id).cloned())
            .collect())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<ActorProfile>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .profiles
            .values()
            .find(|p| p.username == username)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::SubsecRound;

    use super::*;
    use crate::domain::activity::{ActivityType, Metadata};

    fn make_activity(actor_id: Uuid) -> Activity {
        Activity::new(
            actor_id,
            ActivityType::SpotCreated,
            TargetType::Spot,
            Uuid::new_v4(),
            Metadata::new(),
        )
    }

    #[tokio::test]
    async fn test_follower_pages_are_contiguous() {
        let store = MemoryStore::new();
        let followee = Uuid::new_v4();
        for _ in 0..5 {
            store
                .follow(&FollowEdge::new(Uuid::new_v4(), followee).unwrap())
                .await
                .unwrap();
        }
        // unrelated edge must not leak into the followee's range
        store
            .follow(&FollowEdge::new(followee, Uuid::new_v4()).unwrap())
            .await
            .unwrap();

        let first = store.list_followers(followee, None, 2).await.unwrap();
        let second = store.list_followers(followee, first.next_cursor, 2).await.unwrap();
        let third = store.list_followers(followee, second.next_cursor, 2).await.unwrap();

        assert_eq!(first.follower_ids.len(), 2);
        assert_eq!(second.follower_ids.len(), 2);
        assert_eq!(third.follower_ids.len(), 1);
        assert_eq!(third.next_cursor, None);
        let mut all = [first.follower_ids, second.follower_ids, third.follower_ids].concat();
        all.dedup();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_insert_batch_skips_existing_pairs() {
        let store = MemoryStore::new();
        let activity = make_activity(Uuid::new_v4());
        store.append(&activity).await.unwrap();
        let recipient = Uuid::new_v4();

        let first = store
            .insert_batch(&[Notification::for_follower(recipient, &activity)])
            .await
            .unwrap();
        let second = store
            .insert_batch(&[Notification::for_owner(recipient, &activity)])
            .await
            .unwrap();

        assert_eq!((first, second), (1, 0));
        assert_eq!(store.notification_count().await, 1);
    }

    #[tokio::test]
    async fn test_mark_as_read_checks_recipient() {
        let store = MemoryStore::new();
        let activity = make_activity(Uuid::new_v4());
        store.append(&activity).await.unwrap();
        let notification = Notification::for_follower(Uuid::new_v4(), &activity);
        store.insert_batch(&[notification.clone()]).await.unwrap();

        let result = store.mark_as_read(notification.id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
        assert_eq!(store.count_unread(notification.recipient_id).await.unwrap(), 1);

        store
            .mark_as_read(notification.id, notification.recipient_id)
            .await
            .unwrap();
        assert_eq!(store.count_unread(notification.recipient_id).await.unwrap(), 0);
        assert_eq!(store.mark_all_as_read(notification.recipient_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_filters_by_type_and_half_open_range() {
        let store = MemoryStore::new();
        let start = Utc::now().trunc_subsecs(6);
        let minute = chrono::Duration::minutes(1);
        let actor = Uuid::new_v4();

        let mut created = Vec::new();
        for (offset, activity_type, target_type) in [
            (0, ActivityType::SpotCreated, TargetType::Spot),
            (1, ActivityType::RatingGiven, TargetType::Rating),
            (2, ActivityType::SpotCreated, TargetType::Spot),
            (3, ActivityType::CommentPosted, TargetType::Comment),
        ] {
            let mut activity =
                Activity::new(actor, activity_type, target_type, Uuid::new_v4(), Metadata::new());
            activity.created_at = start + minute * offset;
            store.append(&activity).await.unwrap();
            created.push(activity);
        }
        let ids = |found: Vec<Activity>| found.into_iter().map(|a| a.id).collect::<Vec<_>>();

        let any_type = ActivityQuery { limit: 10, ..Default::default() };
        assert_eq!(store.query(&any_type).await.unwrap().len(), 4);

        let spots_only = ActivityQuery {
            activity_types: vec![ActivityType::SpotCreated],
            limit: 10,
            ..Default::default()
        };
        assert_eq!(ids(store.query(&spots_only).await.unwrap()), vec![created[2].id, created[0].id]);

        // since is inclusive, until is exclusive
        let window = ActivityQuery {
            since: Some(created[1].created_at),
            until: Some(created[3].created_at),
            limit: 10,
            ..Default::default()
        };
        assert_eq!(ids(store.query(&window).await.unwrap()), vec![created[2].id, created[1].id]);

        let other_actor = ActivityQuery {
            actor_id: Some(Uuid::new_v4()),
            limit: 10,
            ..Default::default()
        };
        assert!(store.query(&other_actor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unread_only_listing() {
        let store = MemoryStore::new();
        let activity = make_activity(Uuid::new_v4());
        store.append(&activity).await.unwrap();
        let recipient = Uuid::new_v4();
        let notification = Notification::for_follower(recipient, &activity);
        store.insert_batch(&[notification.clone()]).await.unwrap();

        assert_eq!(store.list_for_recipient(recipient, None, true, 10).await.unwrap().len(), 1);
        store.mark_as_read(notification.id, recipient).await.unwrap();
        assert!(store.list_for_recipient(recipient, None, true, 10).await.unwrap().is_empty());
        assert_eq!(store.list_for_recipient(recipient, None, false, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let store = MemoryStore::new();
        store.append(&make_activity(Uuid::new_v4())).await.unwrap();
        store.reset().await;

        assert_eq!(store.activity_count().await, 0);
        assert!(store.batch_sizes().await.is_empty());
    }
}
