use anyhow::{Context, Result};
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::{get, post}};
use gantry_common::shutdown::shutdown_signal;
use kube::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::aims;
use crate::args::ServerArgs;
use crate::config::{AppConfig, resolve_app_config};
use crate::consumer;
use crate::namespaces;
use crate::nodes;
use crate::publisher::FeedbackPublisher;
use crate::quotas;
use crate::secrets;
use crate::storages;
use crate::watch::WatcherRegistry;
use crate::workloads;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub kube: Client,
    pub publisher: Arc<FeedbackPublisher>,
    pub registry: WatcherRegistry,
}

/// Run the dispatcher: one-shot reports, the inbound consumer, all watchers
/// and the health surface.
pub async fn run_server(args: ServerArgs) -> Result<()> {
    // try_default prefers in-cluster config and falls back to the local
    // kubeconfig, which covers USE_LOCAL_KUBE_CONTEXT development runs.
    let kube = Client::try_default()
        .await
        .context("failed to build kube client")?;
    if args.use_local_kube_context {
        tracing::info!("using local kube context");
    }

    let config = resolve_app_config(&kube, args.org_name.clone(), args.cluster_name.clone())
        .await
        .context("failed to resolve dispatcher identity")?;
    tracing::info!(
        org = %config.org_name,
        cluster = %config.cluster_name,
        "dispatcher identity resolved"
    );

    let publisher = Arc::new(FeedbackPublisher::new(args.rabbit.clone()));

    // One-shot bootstrap reports; the controller needs these before any
    // allocation makes sense.
    nodes::publish_cluster_nodes(&kube, &publisher)
        .await
        .context("failed to publish initial node inventory")?;
    nodes::publish_heartbeat(&config, &publisher)
        .await
        .context("failed to publish initial heartbeat")?;
    if let Err(err) = aims::publish_aim_cluster_models(&kube, &publisher).await {
        tracing::warn!(?err, "initial AIM sync failed");
    }

    let cancel = CancellationToken::new();
    let registry = WatcherRegistry::new();
    let mut tasks = Vec::new();

    tasks.push(consumer::spawn_consumer(
        args.clone(),
        kube.clone(),
        publisher.clone(),
        cancel.clone(),
    ));

    workloads::spawn_workload_watchers(&kube, &publisher, &registry, &cancel, &mut tasks).await?;
    quotas::spawn_queue_config_watcher(&kube, &publisher, &registry, &cancel, &mut tasks).await?;
    secrets::spawn_secret_watchers(&kube, &publisher, &registry, &cancel, &mut tasks).await?;
    namespaces::spawn_namespace_watcher(&kube, &publisher, &registry, &cancel, &mut tasks);
    storages::spawn_storage_watcher(&kube, &publisher, &registry, &cancel, &mut tasks);

    // Periodic heartbeat; node and AIM syncs can also be triggered over HTTP
    // by a CronJob.
    {
        let config = config.clone();
        let publisher = publisher.clone();
        let cancel = cancel.clone();
        let interval = std::time::Duration::from_secs(args.heartbeat_interval_seconds);
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(err) = nodes::publish_heartbeat(&config, &publisher).await {
                    tracing::error!(?err, "failed to publish heartbeat");
                }
            }
        }));
    }

    let state = AppState {
        config,
        kube,
        publisher,
        registry,
    };
    let app = Router::new()
        .route("/v1/health", get(health))
        .route("/v1/heartbeats", post(trigger_heartbeat))
        .route("/v1/cluster-nodes", post(trigger_cluster_nodes))
        .route("/v1/aims", post(trigger_aim_sync))
        .with_state(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    tracing::info!(%addr, "starting dispatcher HTTP server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    gantry_common::signal_ready();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain: cancel every background task and wait for the consumer to
    // finish its in-flight message.
    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    tracing::info!("dispatcher stopped gracefully");
    Ok(())
}

/// 500 when any watcher has made no progress for five minutes.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stale = state.registry.stale_watchers();
    if stale.is_empty() {
        (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"status": "degraded", "stale_watchers": stale})),
        )
    }
}

async fn trigger_heartbeat(State(state): State<AppState>) -> impl IntoResponse {
    match nodes::publish_heartbeat(&state.config, &state.publisher).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(err) => {
            tracing::error!(?err, "heartbeat trigger failed");
            StatusCode::BAD_GATEWAY
        }
    }
}

async fn trigger_cluster_nodes(State(state): State<AppState>) -> impl IntoResponse {
    match nodes::publish_cluster_nodes(&state.kube, &state.publisher).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(err) => {
            tracing::error!(?err, "cluster nodes trigger failed");
            StatusCode::BAD_GATEWAY
        }
    }
}

async fn trigger_aim_sync(State(state): State<AppState>) -> impl IntoResponse {
    match aims::publish_aim_cluster_models(&state.kube, &state.publisher).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(err) => {
            tracing::error!(?err, "aim sync trigger failed");
            StatusCode::BAD_GATEWAY
        }
    }
}
