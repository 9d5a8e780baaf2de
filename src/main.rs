mod config;
mod delivery;
mod domain;
mod repository;
mod telemetry;
mod usecase;
mod worker;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    middleware,
    routing::{delete, get, post},
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, FanoutMode};
use crate::delivery::http::v1::activities::{purge_target, record_activity};
use crate::delivery::http::v1::feed::{personal_feed, public_feed, user_activity};
use crate::delivery::http::v1::follows::{follow_status, follow_user, unfollow_user};
use crate::delivery::http::v1::middleware::auth_middleware;
use crate::delivery::http::v1::notifications::{get_unread_count, mark_all_as_read, mark_as_read};
use crate::repository::postgres::{
    PostgresActivityRepository, PostgresFollowRepository, PostgresNotificationRepository,
    PostgresProfileRepository, create_pool,
};
use crate::usecase::activities::ActivityRecorder;
use crate::usecase::composer::MessageComposer;
use crate::usecase::fanout::{FanoutEngine, QueuedFanout};
use crate::usecase::feed::FeedQueryService;
use crate::usecase::follows::FollowsUseCase;
use crate::usecase::jwt::TokenVerifier;
use crate::usecase::notifications::NotificationsUseCase;

type Dispatcher = QueuedFanout<PostgresFollowRepository, PostgresNotificationRepository>;

pub struct AppState {
    pub activity_recorder: ActivityRecorder<PostgresActivityRepository, Dispatcher>,
    pub feed_service: FeedQueryService<
        PostgresActivityRepository,
        PostgresNotificationRepository,
        PostgresProfileRepository,
    >,
    pub notifications_usecase: NotificationsUseCase<PostgresNotificationRepository>,
    pub follows_usecase: FollowsUseCase<PostgresFollowRepository>,
    pub token_verifier: TokenVerifier,
    pub metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let telemetry = telemetry::init(&config).context("failed to initialize tracing")?;

    tracing::info!(
        telemetry_enabled = config.telemetry_enabled,
        fanout_mode = ?config.fanout_mode,
        "starting the activity feed service"
    );

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    metrics_process::Collector::default().describe();
    tracing::info!("prometheus metrics initialized");

    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("failed to create database pool")?;
    tracing::info!("database pool created");

    sqlx::migrate!().run(&pool).await?;
    tracing::info!("database migrations applied");

    let engine = Arc::new(FanoutEngine::new(
        PostgresFollowRepository::new(pool.clone()),
        PostgresNotificationRepository::new(pool.clone()),
        config.fanout_page_size,
    ));

    let jetstream = match config.fanout_mode {
        FanoutMode::Inline => None,
        FanoutMode::Queued => connect_queue(&config.nats_url).await,
    };

    if let Some(jetstream) = jetstream.clone() {
        let activities = PostgresActivityRepository::new(pool.clone());
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = worker::run(jetstream, activities, engine).await {
                tracing::error!(error = %e, "fan-out worker stopped");
            }
        });
    }

    let shared_state = Arc::new(AppState {
        activity_recorder: ActivityRecorder::new(
            PostgresActivityRepository::new(pool.clone()),
            QueuedFanout::new(engine, jetstream),
        ),
        feed_service: FeedQueryService::new(
            PostgresActivityRepository::new(pool.clone()),
            PostgresNotificationRepository::new(pool.clone()),
            PostgresProfileRepository::new(pool.clone()),
            MessageComposer::new(),
        ),
        notifications_usecase: NotificationsUseCase::new(PostgresNotificationRepository::new(
            pool.clone(),
        )),
        follows_usecase: FollowsUseCase::new(PostgresFollowRepository::new(pool)),
        token_verifier: TokenVerifier::new(&config.jwt_secret),
        metrics_handle,
    });

    let authenticated = Router::new()
        .route("/api/v1/activities", post(record_activity))
        .route(
            "/api/v1/activities/targets/{target_type}/{target_id}",
            delete(purge_target),
        )
        .route("/api/v1/feed", get(personal_feed))
        .route("/api/v1/notifications/unread-count", get(get_unread_count))
        .route("/api/v1/notifications/read-all", post(mark_all_as_read))
        .route("/api/v1/notifications/{id}/read", post(mark_as_read))
        .route(
            "/api/v1/users/{id}/follow",
            get(follow_status).post(follow_user).delete(unfollow_user),
        )
        .layer(middleware::from_fn_with_state(
            shared_state.clone(),
            auth_middleware,
        ));

    let public = Router::new()
        .route("/api/v1/feed/public", get(public_feed))
        .route("/api/v1/feed/users/{username}", get(user_activity));

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .merge(authenticated)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(bind_addr = %config.bind_addr, "activity feed service listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    telemetry.shutdown();
    Ok(())
}

/// Falls back to inline fan-out when NATS is unreachable.
async fn connect_queue(nats_url: &str) -> Option<async_nats::jetstream::Context> {
    let client = match async_nats::connect(nats_url).await {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, %nats_url, "failed to connect to NATS, fan-out runs inline");
            return None;
        }
    };
    tracing::info!(%nats_url, "connected to NATS");

    let jetstream = async_nats::jetstream::new(client);
    match worker::ensure_stream(&jetstream).await {
        Ok(_) => Some(jetstream),
        Err(e) => {
            tracing::error!(error = %e, "fan-out stream unavailable, fan-out runs inline");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

async fn metrics(State(state): State<Arc<AppState>>) -> String {
    metrics_process::Collector::default().collect();
    state.metrics_handle.render()
}

#[tracing::instrument]
async fn healthz() -> &'static str {
    "OK"
}
