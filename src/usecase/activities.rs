use serde::Serialize;
use uuid::Uuid;

use crate::domain::activity::{Activity, ActivityType, Metadata, TargetType};
use crate::usecase::contracts::{ActivityRepository, FanoutDispatcher, PurgeSummary};
use crate::usecase::error::UsecaseError;
use crate::usecase::fanout::FanoutOutcome;

/// Roles that may name a target owner and purge targets.
const TRUSTED_ROLES: [&str; 2] = ["admin", "service"];

/// The authenticated principal behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: String,
}

impl Caller {
    pub fn new(user_id: Uuid, role: impl Into<String>) -> Self {
        Self {
            user_id,
            role: role.into(),
        }
    }

    pub fn is_trusted(&self) -> bool {
        TRUSTED_ROLES.contains(&self.role.as_str())
    }
}

/// A persisted activity and what happened to its fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct Recorded {
    pub activity: Activity,
    pub fanout: FanoutOutcome,
}

pub struct ActivityRecorder<A, D>
where
    A: ActivityRepository,
    D: FanoutDispatcher,
{
    activity_repository: A,
    dispatcher: D,
}

impl<A, D> ActivityRecorder<A, D>
where
    A: ActivityRepository,
    D: FanoutDispatcher,
{
    pub fn new(activity_repository: A, dispatcher: D) -> Self {
        Self {
            activity_repository,
            dispatcher,
        }
    }

    pub async fn record(
        &self,
        actor_id: Uuid,
        activity_type: ActivityType,
        target_type: TargetType,
        target_id: Uuid,
        metadata: Metadata,
    ) -> Result<Recorded, UsecaseError> {
        self.append_and_dispatch(actor_id, activity_type, target_type, target_id, metadata, None)
            .await
    }

    /// Records an activity authored by the caller. Only trusted callers may
    /// name a target owner, and only for activity types whose target has one.
    #[tracing::instrument(skip(self, caller, metadata), fields(user_id = %caller.user_id, role = %caller.role, %activity_type, ?owner_id))]
    pub async fn record_with_owner(
        &self,
        caller: &Caller,
        activity_type: ActivityType,
        target_type: TargetType,
        target_id: Uuid,
        metadata: Metadata,
        owner_id: Option<Uuid>,
    ) -> Result<Recorded, UsecaseError> {
        if owner_id.is_some() {
            if !activity_type.has_owner() {
                return Err(UsecaseError::Validation(format!(
                    "activity type {activity_type} has no target owner"
                )));
            }
            if !caller.is_trusted() {
                tracing::warn!(user_id = %caller.user_id, role = %caller.role, "untrusted caller named a target owner");
                return Err(UsecaseError::Forbidden(
                    "Only trusted callers may name a target owner".to_string(),
                ));
            }
        }

        self.append_and_dispatch(
            caller.user_id,
            activity_type,
            target_type,
            target_id,
            metadata,
            owner_id,
        )
        .await
    }

    /// Appends the activity, then hands it to fan-out. Fan-out problems are
    /// reported in the outcome and never undo the append.
    #[tracing::instrument(skip(self, metadata), fields(%actor_id, %activity_type, %target_type, %target_id, ?owner_id))]
    async fn append_and_dispatch(
        &self,
        actor_id: Uuid,
        activity_type: ActivityType,
        target_type: TargetType,
        target_id: Uuid,
        metadata: Metadata,
        owner_id: Option<Uuid>,
    ) -> Result<Recorded, UsecaseError> {
        tracing::debug!("recording activity");

        if !activity_type.allows(target_type) {
            return Err(UsecaseError::Validation(format!(
                "activity type {activity_type} cannot target {target_type}"
            )));
        }

        let activity = Activity::new(actor_id, activity_type, target_type, target_id, metadata);
        self.activity_repository.append(&activity).await?;

        metrics::counter!("feed_activities_recorded_total", "activity_type" => activity_type.as_str())
            .increment(1);
        tracing::info!(activity_id = %activity.id, "activity recorded");

        let fanout = self.dispatcher.dispatch(&activity, owner_id).await;
        Ok(Recorded { activity, fanout })
    }

    /// Deletes a target's activities together with their notifications.
    /// Restricted to trusted callers acting for the target's owning service.
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id, role = %caller.role, %target_type, %target_id))]
    pub async fn purge_target(
        &self,
        caller: &Caller,
        target_type: TargetType,
        target_id: Uuid,
    ) -> Result<PurgeSummary, UsecaseError> {
        tracing::debug!("purging target activities");

        if !caller.is_trusted() {
            tracing::warn!(user_id = %caller.user_id, role = %caller.role, "untrusted purge attempt");
            return Err(UsecaseError::Forbidden(
                "Only trusted callers may purge targets".to_string(),
            ));
        }

        let summary = self
            .activity_repository
            .delete_for_target(target_type, target_id)
            .await?;

        tracing::info!(
            activities = summary.activities_deleted,
            notifications = summary.notifications_deleted,
            "target purged"
        );
        Ok(summary)
    }
}
