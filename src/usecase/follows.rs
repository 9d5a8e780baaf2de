use uuid::Uuid;

use crate::domain::follow::FollowEdge;
use crate::usecase::contracts::FollowRepository;
use crate::usecase::error::UsecaseError;

pub struct FollowsUseCase<F>
where
    F: FollowRepository,
{
    follow_repository: F,
}

impl<F> FollowsUseCase<F>
where
    F: FollowRepository,
{
    pub fn new(follow_repository: F) -> Self {
        Self { follow_repository }
    }

    #[tracing::instrument(skip(self), fields(%follower_id, %followee_id))]
    pub async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<FollowEdge, UsecaseError> {
        tracing::debug!("following user");

        let edge = FollowEdge::new(follower_id, followee_id)
            .map_err(|e| UsecaseError::Validation(e.to_string()))?;

        if !self.follow_repository.follow(&edge).await? {
            return Err(UsecaseError::Conflict("Already following this user".to_string()));
        }

        tracing::info!(%follower_id, %followee_id, "follow created");
        Ok(edge)
    }

    /// Past notifications stay; only future fan-out changes.
    #[tracing::instrument(skip(self), fields(%follower_id, %followee_id))]
    pub async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> Result<(), UsecaseError> {
        tracing::debug!("unfollowing user");

        if !self.follow_repository.unfollow(follower_id, followee_id).await? {
            return Err(UsecaseError::NotFound("Follow".to_string()));
        }

        tracing::info!(%follower_id, %followee_id, "follow removed");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(%follower_id, %followee_id))]
    pub async fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> Result<bool, UsecaseError> {
        Ok(self.follow_repository.is_following(follower_id, followee_id).await?)
    }
}
