use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_nats::jetstream::{self, AckKind, consumer, stream};
use futures::StreamExt;

use crate::repository::postgres::{
    PostgresActivityRepository, PostgresFollowRepository, PostgresNotificationRepository,
};
use crate::usecase::contracts::{ActivityRepository, FollowRepository, NotificationRepository};
use crate::usecase::fanout::{FanoutEngine, FanoutReport};
use crate::usecase::fanout_tasks::{FANOUT_CONSUMER, FANOUT_STREAM, FANOUT_SUBJECT, FanoutTask};

const MAX_DELIVER: i64 = 5;

#[derive(Debug, PartialEq, Eq)]
pub enum TaskResult {
    Done(FanoutReport),
    /// Activity was purged before the task ran.
    Skipped,
    /// Some pages failed; the message stays un-acked for redelivery.
    Retry(FanoutReport),
}

pub async fn ensure_stream(jetstream: &jetstream::Context) -> anyhow::Result<stream::Stream> {
    jetstream
        .get_or_create_stream(stream::Config {
            name: FANOUT_STREAM.to_string(),
            subjects: vec![FANOUT_SUBJECT.to_string()],
            retention: stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        })
        .await
        .with_context(|| format!("failed to create {FANOUT_STREAM} stream"))
}

/// Loads the activity and delivers it. Redelivered tasks are safe to rerun:
/// notifications that already exist are skipped.
#[tracing::instrument(skip(activities, engine), fields(activity_id = %task.activity_id))]
pub async fn handle_task<A, F, N>(
    activities: &A,
    engine: &FanoutEngine<F, N>,
    task: &FanoutTask,
) -> anyhow::Result<TaskResult>
where
    A: ActivityRepository,
    F: FollowRepository,
    N: NotificationRepository,
{
    let Some(activity) = activities
        .find_by_id(task.activity_id)
        .await
        .context("failed to load activity")?
    else {
        tracing::info!("activity no longer exists, skipping fan-out");
        return Ok(TaskResult::Skipped);
    };

    let report = engine.deliver(&activity, task.owner_id).await;
    if report.is_complete() {
        Ok(TaskResult::Done(report))
    } else {
        Ok(TaskResult::Retry(report))
    }
}

pub async fn run(
    jetstream: jetstream::Context,
    activities: PostgresActivityRepository,
    engine: Arc<FanoutEngine<PostgresFollowRepository, PostgresNotificationRepository>>,
) -> anyhow::Result<()> {
    let stream = ensure_stream(&jetstream).await?;
    let consumer = stream
        .get_or_create_consumer(
            FANOUT_CONSUMER,
            consumer::pull::Config {
                durable_name: Some(FANOUT_CONSUMER.to_string()),
                ack_wait: Duration::from_secs(60),
                max_deliver: MAX_DELIVER,
                ..Default::default()
            },
        )
        .await
        .context("failed to create fan-out consumer")?;
    tracing::info!(consumer = FANOUT_CONSUMER, "fan-out worker started");

    loop {
        let mut messages = match consumer.fetch().max_messages(10).messages().await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch fan-out tasks");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        while let Some(message) = messages.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(error = %e, "error receiving fan-out task");
                    continue;
                }
            };

            let task: FanoutTask = match serde_json::from_slice(&message.payload) {
                Ok(task) => task,
                Err(e) => {
                    tracing::error!(error = %e, "malformed fan-out task, terminating delivery");
                    if let Err(e) = message.ack_with(AckKind::Term).await {
                        tracing::error!(error = %e, "failed to terminate message");
                    }
                    continue;
                }
            };

            match handle_task(&activities, &engine, &task).await {
                Ok(TaskResult::Done(_)) | Ok(TaskResult::Skipped) => {
                    if let Err(e) = message.ack().await {
                        tracing::error!(error = %e, activity_id = %task.activity_id, "failed to ack fan-out task");
                    }
                }
                Ok(TaskResult::Retry(report)) => {
                    tracing::warn!(
                        activity_id = %task.activity_id,
                        failed_pages = report.failed_pages,
                        "fan-out incomplete, leaving task for redelivery"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, activity_id = %task.activity_id, "fan-out task failed");
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
