//! Consumer for this cluster's inbound (controller -> dispatcher) queue.

use anyhow::Result;
use gantry_common::messages::Message;
use gantry_common::rabbit;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::args::ServerArgs;
use crate::namespaces;
use crate::publisher::FeedbackPublisher;
use crate::quotas;
use crate::secrets;
use crate::storages;
use crate::workloads;

pub fn spawn_consumer(
    args: ServerArgs,
    client: Client,
    publisher: Arc<FeedbackPublisher>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match run_consumer(&args, &client, &publisher, cancel.clone()).await {
                Ok(()) => return,
                Err(err) => {
                    tracing::error!(?err, "cluster consumer failed, reconnecting in 5s");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
                    }
                }
            }
        }
    })
}

async fn run_consumer(
    args: &ServerArgs,
    client: &Client,
    publisher: &Arc<FeedbackPublisher>,
    cancel: CancellationToken,
) -> Result<()> {
    // The dispatcher's AMQP user is the cluster id; its vhost and queue are
    // derived from it.
    let vhost = format!("vh_{}", args.rabbit.rabbitmq_user);
    let queue = args.rabbit.rabbitmq_user.clone();

    let connection = rabbit::connect(&args.rabbit, &vhost).await?;
    let channel = rabbit::open_channel(&connection, &queue).await?;
    rabbit::consume(
        &channel,
        &queue,
        "gantry-dispatcher",
        cancel,
        |message, _user_id| async move { handle_message(client, publisher, message).await },
    )
    .await
}

async fn handle_message(
    client: &Client,
    publisher: &Arc<FeedbackPublisher>,
    message: Message,
) -> Result<()> {
    match message {
        Message::WorkloadCreate { manifest, .. } => {
            workloads::process_workload_create(client, publisher, &manifest).await
        }
        Message::DeleteWorkload { workload_id } => {
            workloads::process_delete_workload(client, publisher, workload_id).await
        }
        Message::ClusterQuotasAllocation {
            gpu_vendor,
            quota_allocations,
            priority_classes,
        } => {
            quotas::process_quotas_allocation(
                client,
                publisher,
                &quota_allocations,
                gpu_vendor,
                &priority_classes,
            )
            .await
        }
        Message::ProjectNamespaceCreate { name, project_id } => {
            namespaces::process_namespace_create(client, publisher, &name, project_id).await
        }
        Message::ProjectNamespaceDelete { name, project_id } => {
            namespaces::process_namespace_delete(client, publisher, &name, project_id).await
        }
        Message::ProjectSecretsCreate {
            project_secret_id,
            project_name,
            secret_name,
            manifest,
            secret_type,
        } => {
            secrets::process_project_secrets_create(
                client,
                publisher,
                project_secret_id,
                &project_name,
                &secret_name,
                &manifest,
                secret_type,
            )
            .await
        }
        Message::ProjectSecretsDelete {
            project_secret_id,
            project_name,
            secret_type,
        } => {
            secrets::process_project_secrets_delete(
                client,
                publisher,
                project_secret_id,
                &project_name,
                secret_type,
            )
            .await
        }
        Message::ProjectS3StorageCreate {
            project_storage_id,
            project_name,
            storage_name,
            secret_name,
            bucket_url,
            access_key_name,
            secret_key_name,
        } => {
            storages::process_storage_create(
                client,
                publisher,
                project_storage_id,
                &project_name,
                &storage_name,
                &secret_name,
                &bucket_url,
                &access_key_name,
                &secret_key_name,
            )
            .await
        }
        Message::ProjectStorageDelete {
            project_storage_id,
            project_name,
        } => {
            storages::process_storage_delete(client, publisher, project_storage_id, &project_name)
                .await
        }
        other => {
            anyhow::bail!(
                "unexpected inbound message {} on the cluster queue",
                other.message_type()
            );
        }
    }
}
