use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::activity::{Activity, ActivityType};
use crate::domain::feed::{ActivityEntry, Cursor, FeedPage, NotificationEntry, PersonalFeedPage};
use crate::domain::profile::{ActorProfile, TargetSnapshot};
use crate::usecase::composer::MessageComposer;
use crate::usecase::contracts::{
    ActivityQuery, ActivityRepository, NotificationRepository, ProfileRepository,
};
use crate::usecase::error::UsecaseError;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Decoded paging request. `Invalid` short-circuits to an empty page.
enum PageStart {
    First,
    After(Cursor),
    Invalid,
}

impl PageStart {
    fn parse(cursor: Option<&str>) -> Self {
        match cursor.map(str::trim).filter(|token| !token.is_empty()) {
            None => PageStart::First,
            Some(token) => Cursor::decode(token).map_or(PageStart::Invalid, PageStart::After),
        }
    }
}

/// Splits an over-fetched `limit + 1` result into the page and its next cursor.
fn split_page<T>(mut rows: Vec<T>, limit: usize, key: impl Fn(&T) -> Cursor) -> (Vec<T>, Option<String>) {
    if rows.len() <= limit {
        return (rows, None);
    }
    rows.truncate(limit);
    let next = rows.last().map(|last| key(last).encode());
    (rows, next)
}

/// Narrows the public and per-user feeds by type and time range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityFilter {
    /// Empty means any type.
    pub activity_types: Vec<ActivityType>,
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

pub struct FeedQueryService<A, N, P>
where
    A: ActivityRepository,
    N: NotificationRepository,
    P: ProfileRepository,
{
    activity_repository: A,
    notification_repository: N,
    profile_repository: P,
    composer: MessageComposer,
}

impl<A, N, P> FeedQueryService<A, N, P>
where
    A: ActivityRepository,
    N: NotificationRepository,
    P: ProfileRepository,
{
    pub fn new(
        activity_repository: A,
        notification_repository: N,
        profile_repository: P,
        composer: MessageComposer,
    ) -> Self {
        Self {
            activity_repository,
            notification_repository,
            profile_repository,
            composer,
        }
    }

    /// The caller's notifications with rendered text, newest first, plus
    /// their unread total. `unread_only` drops notifications already read.
    #[tracing::instrument(skip(self, cursor), fields(%user_id, %limit))]
    pub async fn get_personal_feed(
        &self,
        user_id: Uuid,
        unread_only: bool,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<PersonalFeedPage, UsecaseError> {
        tracing::debug!("loading personal feed");

        let unread_count = self.notification_repository.count_unread(user_id).await?;

        let before = match PageStart::parse(cursor) {
            PageStart::First => None,
            PageStart::After(cursor) => Some(cursor),
            PageStart::Invalid => {
                tracing::debug!("invalid cursor, returning empty page");
                return Ok(PersonalFeedPage {
                    page: FeedPage::empty(),
                    unread_count,
                });
            }
        };
        let limit = clamp_limit(limit);

        let rows = self
            .notification_repository
            .list_for_recipient(user_id, before, unread_only, limit + 1)
            .await?;
        let (rows, next_cursor) = split_page(rows, limit as usize, |row| {
            Cursor::new(row.notification.created_at, row.notification.id)
        });

        let actors = self.load_actors(rows.iter().map(|row| &row.activity)).await?;
        let items = rows
            .into_iter()
            .map(|row| {
                let actor = actors.get(&row.activity.actor_id).cloned();
                let message = self.composer.compose(
                    &row.notification,
                    &row.activity,
                    actor.as_ref(),
                    &TargetSnapshot::from_activity(&row.activity),
                );
                NotificationEntry {
                    notification: row.notification,
                    activity: row.activity,
                    actor,
                    message,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(count = items.len(), has_more = next_cursor.is_some(), unread_count, "personal feed loaded");
        Ok(PersonalFeedPage {
            page: FeedPage { items, next_cursor },
            unread_count,
        })
    }

    #[tracing::instrument(skip(self, cursor), fields(?filter, %limit))]
    pub async fn get_public_feed(
        &self,
        filter: &ActivityFilter,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<FeedPage<ActivityEntry>, UsecaseError> {
        tracing::debug!("loading public feed");
        self.activity_page(None, filter, cursor, limit).await
    }

    #[tracing::instrument(skip(self, cursor), fields(%username, ?filter, %limit))]
    pub async fn get_user_activity(
        &self,
        username: &str,
        filter: &ActivityFilter,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<FeedPage<ActivityEntry>, UsecaseError> {
        tracing::debug!("loading user activity");

        let profile = self
            .profile_repository
            .find_by_username(username)
            .await?
            .ok_or_else(|| UsecaseError::NotFound(format!("User {username}")))?;

        self.activity_page(Some(profile.id), filter, cursor, limit).await
    }

    async fn activity_page(
        &self,
        actor_id: Option<Uuid>,
        filter: &ActivityFilter,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<FeedPage<ActivityEntry>, UsecaseError> {
        let before = match PageStart::parse(cursor) {
            PageStart::First => None,
            PageStart::After(cursor) => Some(cursor),
            PageStart::Invalid => {
                tracing::debug!("invalid cursor, returning empty page");
                return Ok(FeedPage::empty());
            }
        };
        let limit = clamp_limit(limit);

        let query = ActivityQuery {
            actor_id,
            activity_types: filter.activity_types.clone(),
            since: filter.since,
            until: filter.until,
            before,
            limit: limit + 1,
        };
        let activities = self.activity_repository.query(&query).await?;
        let (activities, next_cursor) =
            split_page(activities, limit as usize, |a| Cursor::new(a.created_at, a.id));

        let actors = self.load_actors(activities.iter()).await?;
        let items = activities
            .into_iter()
            .map(|activity| ActivityEntry {
                actor: actors.get(&activity.actor_id).cloned(),
                activity,
            })
            .collect::<Vec<_>>();

        tracing::debug!(count = items.len(), has_more = next_cursor.is_some(), "activity page loaded");
        Ok(FeedPage { items, next_cursor })
    }

    /// One lookup for all distinct actors on the page.
    async fn load_actors<'a>(
        &self,
        activities: impl Iterator<Item = &'a Activity>,
    ) -> Result<HashMap<Uuid, ActorProfile>, UsecaseError> {
        let ids: Vec<Uuid> = activities
            .map(|a| a.actor_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let profiles = self.profile_repository.find_by_ids(&ids).await?;
        Ok(profiles.into_iter().map(|p| (p.id, p)).collect())
    }
}

pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_LIMIT)
}
