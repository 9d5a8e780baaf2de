use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::activity::Activity;
use crate::domain::notification::Notification;
use crate::usecase::contracts::{FanoutDispatcher, FollowRepository, NotificationRepository};
use crate::usecase::fanout_tasks::{FANOUT_SUBJECT, FanoutTask};

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Aggregate result of one fan-out run. Failures are counted, never raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub created: u64,
    pub skipped_duplicates: u64,
    pub pages: u32,
    pub failed_pages: u32,
    pub failed_recipients: u64,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.failed_pages == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FanoutOutcome {
    Completed(FanoutReport),
    Queued,
}

pub struct FanoutEngine<F, N>
where
    F: FollowRepository,
    N: NotificationRepository,
{
    follow_repository: F,
    notification_repository: N,
    page_size: usize,
}

impl<F, N> FanoutEngine<F, N>
where
    F: FollowRepository,
    N: NotificationRepository,
{
    pub fn new(follow_repository: F, notification_repository: N, page_size: usize) -> Self {
        Self {
            follow_repository,
            notification_repository,
            page_size: page_size.max(1),
        }
    }

    /// Writes one notification per follower of the actor, one batch per follower page.
    #[tracing::instrument(skip(self, activity), fields(activity_id = %activity.id, actor_id = %activity.actor_id))]
    pub async fn fanout(&self, activity: &Activity) -> FanoutReport {
        let mut report = FanoutReport::default();
        self.fanout_followers(activity, None, &mut report).await;
        report
    }

    /// Notifies the target owner first, then every follower except the owner.
    #[tracing::instrument(skip(self, activity), fields(activity_id = %activity.id, actor_id = %activity.actor_id, ?owner_id))]
    pub async fn deliver(&self, activity: &Activity, owner_id: Option<Uuid>) -> FanoutReport {
        let started = Instant::now();
        let mut report = FanoutReport::default();

        let owner_id = owner_id.filter(|owner| *owner != activity.actor_id);
        if let Some(owner) = owner_id {
            tracing::debug!(%owner, "notifying target owner");
            self.write_batch(&[Notification::for_owner(owner, activity)], &mut report)
                .await;
        }

        self.fanout_followers(activity, owner_id, &mut report).await;

        metrics::histogram!("feed_fanout_duration_seconds").record(started.elapsed().as_secs_f64());
        if report.is_complete() {
            tracing::info!(created = report.created, duplicates = report.skipped_duplicates, pages = report.pages, "fan-out finished");
        } else {
            tracing::warn!(
                created = report.created,
                failed_pages = report.failed_pages,
                failed_recipients = report.failed_recipients,
                "fan-out finished with failed pages"
            );
        }
        report
    }

    async fn fanout_followers(
        &self,
        activity: &Activity,
        exclude: Option<Uuid>,
        report: &mut FanoutReport,
    ) {
        let mut after: Option<Uuid> = None;
        loop {
            let page = match self
                .follow_repository
                .list_followers(activity.actor_id, after, self.page_size as i64)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    // without the page there is no cursor to continue from
                    tracing::error!(error = %e, ?after, "failed to list followers, stopping fan-out");
                    metrics::counter!("feed_fanout_page_failures_total").increment(1);
                    report.failed_pages += 1;
                    return;
                }
            };

            let batch: Vec<Notification> = page
                .follower_ids
                .iter()
                .copied()
                .filter(|id| *id != activity.actor_id && Some(*id) != exclude)
                .map(|id| Notification::for_follower(id, activity))
                .collect();
            self.write_batch(&batch, report).await;

            match page.next_cursor {
                Some(next) if Some(next) != after => after = Some(next),
                Some(_) => {
                    tracing::error!(?after, "follower cursor did not advance, stopping fan-out");
                    return;
                }
                None => return,
            }
        }
    }

    async fn write_batch(&self, batch: &[Notification], report: &mut FanoutReport) {
        if batch.is_empty() {
            return;
        }
        report.pages += 1;
        let size = batch.len() as u64;

        match self.notification_repository.insert_batch(batch).await {
            Ok(inserted) => {
                let inserted = inserted.min(size);
                report.created += inserted;
                report.skipped_duplicates += size - inserted;
                metrics::counter!("feed_notifications_created_total").increment(inserted);
                metrics::counter!("feed_notifications_duplicate_total").increment(size - inserted);
                tracing::debug!(size, inserted, "notification batch written");
            }
            Err(e) => {
                report.failed_pages += 1;
                report.failed_recipients += size;
                metrics::counter!("feed_fanout_page_failures_total").increment(1);
                tracing::warn!(error = %e, size, "failed to write notification batch, continuing");
            }
        }
    }
}

impl<F, N> FanoutDispatcher for FanoutEngine<F, N>
where
    F: FollowRepository,
    N: NotificationRepository,
{
    async fn dispatch(&self, activity: &Activity, owner_id: Option<Uuid>) -> FanoutOutcome {
        FanoutOutcome::Completed(self.deliver(activity, owner_id).await)
    }
}

/// Publishes fan-out to JetStream when a queue is configured; runs it
/// inline otherwise, or when publishing fails.
pub struct QueuedFanout<F, N>
where
    F: FollowRepository,
    N: NotificationRepository,
{
    engine: Arc<FanoutEngine<F, N>>,
    jetstream: Option<async_nats::jetstream::Context>,
}

impl<F, N> QueuedFanout<F, N>
where
    F: FollowRepository,
    N: NotificationRepository,
{
    pub fn new(
        engine: Arc<FanoutEngine<F, N>>,
        jetstream: Option<async_nats::jetstream::Context>,
    ) -> Self {
        Self { engine, jetstream }
    }
}

impl<F, N> FanoutDispatcher for QueuedFanout<F, N>
where
    F: FollowRepository,
    N: NotificationRepository,
{
    async fn dispatch(&self, activity: &Activity, owner_id: Option<Uuid>) -> FanoutOutcome {
        if let Some(jetstream) = &self.jetstream {
            let task = FanoutTask::for_activity(activity, owner_id);
            match publish_task(jetstream, &task).await {
                Ok(()) => {
                    tracing::info!(activity_id = %task.activity_id, "queued fan-out task");
                    return FanoutOutcome::Queued;
                }
                Err(e) => {
                    tracing::warn!(activity_id = %task.activity_id, error = %e, "failed to queue fan-out task, running inline");
                }
            }
        }
        FanoutOutcome::Completed(self.engine.deliver(activity, owner_id).await)
    }
}

async fn publish_task(
    jetstream: &async_nats::jetstream::Context,
    task: &FanoutTask,
) -> anyhow::Result<()> {
    let payload = serde_json::to_vec(task).context("failed to serialize fan-out task")?;
    let ack = jetstream
        .publish(FANOUT_SUBJECT, payload.into())
        .await
        .context("failed to publish fan-out task")?;
    ack.await.context("failed to get publish ack")?;
    Ok(())
}
