use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

use crate::{
    domain::activity::{Activity, Metadata, TargetType},
    domain::feed::Cursor,
    domain::follow::FollowEdge,
    domain::notification::{Notification, NotificationWithActivity},
    domain::profile::ActorProfile,
    repository::errors::RepositoryError,
    usecase::contracts::{
        ActivityQuery, ActivityRepository, FollowRepository, FollowerPage, NotificationRepository,
        ProfileRepository, PurgeSummary,
    },
};

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: Uuid,
    actor_id: Uuid,
    activity_type: String,
    target_type: String,
    target_id: Uuid,
    metadata: Json<Metadata>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for Activity {
    type Error = RepositoryError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        Ok(Activity {
            id: row.id,
            actor_id: row.actor_id,
            activity_type: row
                .activity_type
                .parse()
                .map_err(|e| RepositoryError::CorruptRow(format!("activity {}: {e}", row.id)))?,
            target_type: row
                .target_type
                .parse()
                .map_err(|e| RepositoryError::CorruptRow(format!("activity {}: {e}", row.id)))?,
            target_id: row.target_id,
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationActivityRow {
    id: Uuid,
    recipient_id: Uuid,
    activity_id: Uuid,
    reason: String,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    activity: ActivityColumns,
}

/// Activity columns aliased with an `activity_` prefix in notification joins.
#[derive(sqlx::FromRow)]
struct ActivityColumns {
    activity_actor_id: Uuid,
    activity_type: String,
    activity_target_type: String,
    activity_target_id: Uuid,
    activity_metadata: Json<Metadata>,
    activity_created_at: DateTime<Utc>,
}

impl TryFrom<NotificationActivityRow> for NotificationWithActivity {
    type Error = RepositoryError;

    fn try_from(row: NotificationActivityRow) -> Result<Self, Self::Error> {
        let activity = Activity::try_from(ActivityRow {
            id: row.activity_id,
            actor_id: row.activity.activity_actor_id,
            activity_type: row.activity.activity_type,
            target_type: row.activity.activity_target_type,
            target_id: row.activity.activity_target_id,
            metadata: row.activity.activity_metadata,
            created_at: row.activity.activity_created_at,
        })?;
        let reason = row
            .reason
            .parse()
            .map_err(|e| RepositoryError::CorruptRow(format!("notification {}: {e}", row.id)))?;

        Ok(NotificationWithActivity {
            notification: Notification {
                id: row.id,
                recipient_id: row.recipient_id,
                activity_id: row.activity_id,
                reason,
                is_read: row.is_read,
                read_at: row.read_at,
                created_at: row.created_at,
            },
            activity,
        })
    }
}

#[derive(Clone)]
pub struct PostgresActivityRepository {
    pool: PgPool,
}

impl PostgresActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ActivityRepository for PostgresActivityRepository {
    #[tracing::instrument(skip(self, activity), fields(activity_id = %activity.id, actor_id = %activity.actor_id))]
    async fn append(&self, activity: &Activity) -> Result<(), RepositoryError> {
        tracing::debug!("appending activity");

        sqlx::query(
            r#"
            INSERT INTO activities (id, actor_id, activity_type, target_type, target_id, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(activity.id)
        .bind(activity.actor_id)
        .bind(activity.activity_type.as_str())
        .bind(activity.target_type.as_str())
        .bind(activity.target_id)
        .bind(Json(&activity.metadata))
        .bind(activity.created_at)
        .execute(&self.pool)
        .await
        ?;

        tracing::debug!(activity_id = %activity.id, "activity appended");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(activity_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Activity>, RepositoryError> {
        tracing::debug!("finding activity by id");

        let row = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, actor_id, activity_type, target_type, target_id, metadata, created_at
            FROM activities
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        ?;

        row.map(Activity::try_from).transpose()
    }

    #[tracing::instrument(skip(self, query), fields(actor_id = ?query.actor_id, limit = query.limit))]
    async fn query(&self, query: &ActivityQuery) -> Result<Vec<Activity>, RepositoryError> {
        tracing::debug!("querying activities");

        let types: Vec<&str> = query.activity_types.iter().map(|t| t.as_str()).collect();
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, actor_id, activity_type, target_type, target_id, metadata, created_at
            FROM activities
            WHERE ($1::uuid IS NULL OR actor_id = $1)
              AND (cardinality($2::text[]) = 0 OR activity_type = ANY($2))
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at < $4)
              AND ($5::timestamptz IS NULL OR (created_at, id) < ($5, $6::uuid))
            ORDER BY created_at DESC, id DESC
            LIMIT $7
            "#,
        )
        .bind(query.actor_id)
        .bind(&types)
        .bind(query.since)
        .bind(query.until)
        .bind(query.before.map(|c| c.created_at))
        .bind(query.before.map(|c| c.id))
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        ?;

        tracing::debug!(count = rows.len(), "activities found");
        rows.into_iter().map(Activity::try_from).collect()
    }

    #[tracing::instrument(skip(self), fields(%target_type, %target_id))]
    async fn delete_for_target(
        &self,
        target_type: TargetType,
        target_id: Uuid,
    ) -> Result<PurgeSummary, RepositoryError> {
        tracing::debug!("deleting activities for target");

        let mut tx = self.pool.begin().await?;

        // row locks block concurrent notification inserts referencing these activities
        sqlx::query("SELECT id FROM activities WHERE target_type = $1 AND target_id = $2 FOR UPDATE")
            .bind(target_type.as_str())
            .bind(target_id)
            .fetch_all(&mut *tx)
            .await?;

        let notifications = sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE activity_id IN (
                SELECT id FROM activities WHERE target_type = $1 AND target_id = $2
            )
            "#,
        )
        .bind(target_type.as_str())
        .bind(target_id)
        .execute(&mut *tx)
        .await?;

        let activities = sqlx::query("DELETE FROM activities WHERE target_type = $1 AND target_id = $2")
            .bind(target_type.as_str())
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let summary = PurgeSummary {
            activities_deleted: activities.rows_affected(),
            notifications_deleted: notifications.rows_affected(),
        };
        tracing::debug!(?summary, "target activities deleted");
        Ok(summary)
    }
}

#[derive(Clone)]
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl NotificationRepository for PostgresNotificationRepository {
    #[tracing::instrument(skip(self, notifications), fields(size = notifications.len()))]
    async fn insert_batch(&self, notifications: &[Notification]) -> Result<u64, RepositoryError> {
        if notifications.is_empty() {
            return Ok(0);
        }
        tracing::debug!("inserting notification batch");

        let ids: Vec<Uuid> = notifications.iter().map(|n| n.id).collect();
        let recipients: Vec<Uuid> = notifications.iter().map(|n| n.recipient_id).collect();
        let activities: Vec<Uuid> = notifications.iter().map(|n| n.activity_id).collect();
        let reasons: Vec<&str> = notifications.iter().map(|n| n.reason.as_str()).collect();
        let created: Vec<DateTime<Utc>> = notifications.iter().map(|n| n.created_at).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient_id, activity_id, reason, is_read, created_at)
            SELECT id, recipient_id, activity_id, reason, FALSE, created_at
            FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::text[], $5::timestamptz[])
                AS batch (id, recipient_id, activity_id, reason, created_at)
            ON CONFLICT (recipient_id, activity_id) DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(&recipients)
        .bind(&activities)
        .bind(&reasons)
        .bind(&created)
        .execute(&self.pool)
        .await
        ?;

        tracing::debug!(inserted = result.rows_affected(), "notification batch inserted");
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(%recipient_id, %limit))]
    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        before: Option<Cursor>,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<NotificationWithActivity>, RepositoryError> {
        tracing::debug!("listing notifications");

        let rows = sqlx::query_as::<_, NotificationActivityRow>(
            r#"
            SELECT n.id, n.recipient_id, n.activity_id, n.reason, n.is_read, n.read_at, n.created_at,
                   a.actor_id AS activity_actor_id,
                   a.activity_type,
                   a.target_type AS activity_target_type,
                   a.target_id AS activity_target_id,
                   a.metadata AS activity_metadata,
                   a.created_at AS activity_created_at
            FROM notifications n
            JOIN activities a ON a.id = n.activity_id
            WHERE n.recipient_id = $1
              AND ($2::timestamptz IS NULL OR (n.created_at, n.id) < ($2, $3::uuid))
              AND (NOT $4 OR NOT n.is_read)
            ORDER BY n.created_at DESC, n.id DESC
            LIMIT $5
            "#,
        )
        .bind(recipient_id)
        .bind(before.map(|c| c.created_at))
        .bind(before.map(|c| c.id))
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        ?;

        tracing::debug!(%recipient_id, count = rows.len(), "notifications found");
        rows.into_iter().map(NotificationWithActivity::try_from).collect()
    }

    #[tracing::instrument(skip(self), fields(%recipient_id))]
    async fn count_unread(&self, recipient_id: Uuid) -> Result<i64, RepositoryError> {
        tracing::debug!("counting unread notifications");

        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE recipient_id = $1 AND NOT is_read
            "#,
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await
        ?;

        Ok(count.0)
    }

    #[tracing::instrument(skip(self), fields(notification_id = %id, %recipient_id))]
    async fn mark_as_read(&self, id: Uuid, recipient_id: Uuid) -> Result<(), RepositoryError> {
        tracing::debug!("marking notification as read");

        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, now())
            WHERE id = $1 AND recipient_id = $2
            "#,
        )
        .bind(id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await
        ?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(%recipient_id))]
    async fn mark_all_as_read(&self, recipient_id: Uuid) -> Result<u64, RepositoryError> {
        tracing::debug!("marking all notifications as read");

        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = now()
            WHERE recipient_id = $1 AND NOT is_read
            "#,
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await
        ?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PostgresFollowRepository {
    pool: PgPool,
}

impl PostgresFollowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl FollowRepository for PostgresFollowRepository {
    #[tracing::instrument(skip(self, edge), fields(follower_id = %edge.follower_id, followee_id = %edge.followee_id))]
    async fn follow(&self, edge: &FollowEdge) -> Result<bool, RepositoryError> {
        tracing::debug!("creating follow edge");

        let result = sqlx::query(
            r#"
            INSERT INTO user_follows (follower_id, followee_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (followee_id, follower_id) DO NOTHING
            "#,
        )
        .bind(edge.follower_id)
        .bind(edge.followee_id)
        .bind(edge.created_at)
        .execute(&self.pool)
        .await
        ?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self), fields(%follower_id, %followee_id))]
    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, RepositoryError> {
        tracing::debug!("removing follow edge");

        let result = sqlx::query(
            r#"
            DELETE FROM user_follows
            WHERE follower_id = $1 AND followee_id = $2
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(&self.pool)
        .await
        ?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self), fields(%follower_id, %followee_id))]
    async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, RepositoryError> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM user_follows WHERE follower_id = $1 AND followee_id = $2
            )
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_one(&self.pool)
        .await
        ?;

        Ok(exists.0)
    }

    #[tracing::instrument(skip(self), fields(%followee_id, ?after, %limit))]
    async fn list_followers(
        &self,
        followee_id: Uuid,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<FollowerPage, RepositoryError> {
        tracing::debug!("listing followers");

        let limit = limit.max(1);
        let mut follower_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT follower_id FROM user_follows
            WHERE followee_id = $1 AND ($2::uuid IS NULL OR follower_id > $2)
            ORDER BY follower_id
            LIMIT $3
            "#,
        )
        .bind(followee_id)
        .bind(after)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await
        ?;

        let next_cursor = if follower_ids.len() as i64 > limit {
            follower_ids.truncate(limit as usize);
            follower_ids.last().copied()
        } else {
            None
        };

        tracing::debug!(count = follower_ids.len(), has_more = next_cursor.is_some(), "followers page loaded");
        Ok(FollowerPage {
            follower_ids,
            next_cursor,
        })
    }
}

#[derive(Clone)]
pub struct PostgresProfileRepository {
    pool: PgPool,
}

impl PostgresProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ProfileRepository for PostgresProfileRepository {
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ActorProfile>, RepositoryError> {
        tracing::debug!("finding profiles by ids");

        let profiles = sqlx::query_as::<_, ActorProfile>(
            r#"
            SELECT id, username, display_name, profile_photo_url
            FROM user_profiles
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        ?;

        Ok(profiles)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_username(&self, username: &str) -> Result<Option<ActorProfile>, RepositoryError> {
        tracing::debug!("finding profile by username");

        let profile = sqlx::query_as::<_, ActorProfile>(
            r#"
            SELECT id, username, display_name, profile_photo_url
            FROM user_profiles
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        ?;

        Ok(profile)
    }
}

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
