//! Inbound consumer for the shared dispatcher -> controller queue.
//!
//! The sending cluster is identified by the AMQP `user_id` property, which
//! the broker guarantees matches the authenticated user (the cluster id).
//! Every message is processed in its own transaction-plus-outbox; handler
//! errors nack with requeue, so handlers are idempotent.

use anyhow::Result;
use gantry_common::messages::{self, Message};
use gantry_common::rabbit;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aims;
use crate::cluster_db;
use crate::clusters;
use crate::outbox::Outbox;
use crate::projects;
use crate::quotas;
use crate::secrets;
use crate::server::AppState;
use crate::storages;
use crate::workloads;

pub fn spawn_consumer(state: AppState, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match run_consumer(&state, cancel.clone()).await {
                Ok(()) => return,
                Err(err) => {
                    tracing::error!(?err, "inbound consumer failed, reconnecting in 5s");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
                    }
                }
            }
        }
    })
}

async fn run_consumer(state: &AppState, cancel: CancellationToken) -> Result<()> {
    let connection = rabbit::connect(&state.rabbit, messages::COMMON_VHOST).await?;
    let channel = rabbit::open_channel(&connection, messages::COMMON_QUEUE).await?;
    rabbit::consume(
        &channel,
        messages::COMMON_QUEUE,
        "gantry-controller",
        cancel,
        |message, user_id| async move { handle_message(state, message, user_id).await },
    )
    .await
}

async fn handle_message(state: &AppState, message: Message, user_id: Option<String>) -> Result<()> {
    let Some(cluster_id) = user_id.as_deref().and_then(|id| Uuid::parse_str(id).ok()) else {
        tracing::warn!(?user_id, "message without a cluster identity, dropping");
        return Ok(());
    };

    let mut client = state.pool.get().await?;
    let tx = client.transaction().await?;

    let Some(cluster) = cluster_db::get_cluster(&tx, cluster_id).await? else {
        tracing::warn!(%cluster_id, "message from unknown cluster, dropping");
        return Ok(());
    };

    let mut outbox = Outbox::new();

    match message {
        Message::Heartbeat {
            cluster_name,
            organization_name,
            last_heartbeat_at,
        } => {
            clusters::handle_heartbeat(
                &tx,
                &cluster,
                &cluster_name,
                &organization_name,
                last_heartbeat_at,
            )
            .await?;
        }
        Message::ClusterNodes {
            cluster_nodes,
            updated_at,
        } => {
            clusters::handle_cluster_nodes(&tx, &mut outbox, &cluster, &cluster_nodes, updated_at)
                .await?;
        }
        Message::ClusterQuotasStatus {
            quota_allocations,
            updated_at,
        } => {
            quotas::handle_quotas_status(
                &tx,
                &state.identity,
                &cluster,
                &quota_allocations,
                updated_at,
            )
            .await?;
        }
        Message::ClusterQuotasFailure { reason, updated_at } => {
            quotas::handle_quotas_failure(
                &tx,
                &state.identity,
                &cluster,
                reason.as_deref(),
                updated_at,
            )
            .await?;
        }
        Message::WorkloadStatusUpdate {
            workload_id,
            status,
            status_reason,
            updated_at,
        } => {
            workloads::handle_workload_status(
                &tx,
                workload_id,
                status,
                status_reason.as_deref(),
                updated_at,
            )
            .await?;
        }
        Message::WorkloadComponentStatusUpdate {
            id,
            workload_id,
            status,
            status_reason,
            updated_at,
            ..
        } => {
            workloads::handle_component_status(
                &tx,
                id,
                workload_id,
                status,
                status_reason.as_deref(),
                updated_at,
            )
            .await?;
        }
        Message::AutoDiscoveredWorkloadComponent {
            project_id,
            workload_id,
            component_id,
            name,
            kind,
            api_version,
            submitter,
            ..
        } => {
            workloads::handle_auto_discovered_component(
                &tx,
                project_id,
                workload_id,
                component_id,
                &name,
                kind,
                &api_version,
                submitter.as_deref(),
            )
            .await?;
        }
        Message::ProjectNamespaceStatus {
            project_id,
            status,
            status_reason,
            updated_at,
        } => {
            projects::handle_namespace_status(
                &tx,
                &state.identity,
                &cluster,
                project_id,
                status,
                status_reason.as_deref(),
                updated_at,
            )
            .await?;
        }
        Message::ProjectSecretsUpdate {
            project_secret_id,
            status,
            status_reason,
            updated_at,
        } => {
            secrets::handle_project_secret_update(
                &tx,
                cluster.organization_id,
                project_secret_id,
                status,
                status_reason.as_deref(),
                updated_at,
            )
            .await?;
        }
        Message::ProjectStorageUpdate {
            project_storage_id,
            status,
            status_reason,
            updated_at,
        } => {
            storages::handle_project_storage_update(
                &tx,
                cluster.organization_id,
                project_storage_id,
                status,
                status_reason.as_deref(),
                updated_at,
            )
            .await?;
        }
        Message::AimClusterModels { models, .. } => {
            aims::reconcile_aims_from_cluster(&tx, &models).await?;
        }
        other => {
            anyhow::bail!(
                "unexpected outbound message {} on the inbound queue",
                other.message_type()
            );
        }
    }

    tx.commit().await?;
    outbox.flush(state.fabric.as_ref()).await?;
    Ok(())
}
