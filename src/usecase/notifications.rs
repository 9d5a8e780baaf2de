use uuid::Uuid;

use crate::repository::errors::RepositoryError;
use crate::usecase::contracts::NotificationRepository;
use crate::usecase::error::UsecaseError;

pub struct NotificationsUseCase<N>
where
    N: NotificationRepository,
{
    notification_repository: N,
}

impl<N> NotificationsUseCase<N>
where
    N: NotificationRepository,
{
    pub fn new(notification_repository: N) -> Self {
        Self { notification_repository }
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn count_unread(&self, user_id: Uuid) -> Result<i64, UsecaseError> {
        tracing::debug!("counting unread notifications");

        let count = self.notification_repository.count_unread(user_id).await?;

        tracing::debug!(user_id = %user_id, count, "unread count retrieved");
        Ok(count)
    }

    #[tracing::instrument(skip(self), fields(notification_id = %id, user_id = %user_id))]
    pub async fn mark_as_read(&self, id: Uuid, user_id: Uuid) -> Result<(), UsecaseError> {
        tracing::debug!("marking notification as read");

        self.notification_repository
            .mark_as_read(id, user_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => UsecaseError::NotFound(format!("Notification {id}")),
                other => other.into(),
            })?;

        tracing::info!(notification_id = %id, "notification marked as read");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64, UsecaseError> {
        tracing::debug!("marking all notifications as read");

        let updated = self.notification_repository.mark_all_as_read(user_id).await?;

        tracing::info!(user_id = %user_id, updated, "all notifications marked as read");
        Ok(updated)
    }
}
