//! Storage config-map materialization and status watching.

use anyhow::Result;
use chrono::Utc;
use gantry_common::labels;
use gantry_common::messages::{ConfigMapStatus, Message};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client, ResourceExt};
use kube::runtime::watcher;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::kube_util;
use crate::publisher::FeedbackPublisher;
use crate::watch::{WatchEvent, WatcherRegistry, run_watcher};

async fn publish_status(
    publisher: &FeedbackPublisher,
    project_storage_id: Uuid,
    status: ConfigMapStatus,
    reason: String,
) {
    let message = Message::ProjectStorageUpdate {
        project_storage_id,
        status,
        status_reason: Some(reason),
        updated_at: Utc::now(),
    };
    if let Err(err) = publisher.publish(&message).await {
        tracing::error!(?err, "failed to publish storage status");
    }
}

/// Connection details for the bucket, minus the credentials themselves;
/// workloads read those from the secret named here.
#[allow(clippy::too_many_arguments)]
pub fn build_storage_configmap(
    storage_name: &str,
    namespace: &str,
    bucket_url: &str,
    project_storage_id: Uuid,
    secret_name: &str,
    access_key_name: &str,
    secret_key_name: &str,
) -> ConfigMap {
    let mut configmap_labels = BTreeMap::new();
    configmap_labels.insert(
        labels::PROJECT_STORAGE_ID.to_string(),
        project_storage_id.to_string(),
    );
    let mut data = BTreeMap::new();
    data.insert("bucket_url".to_string(), bucket_url.to_string());
    data.insert("secret_name".to_string(), secret_name.to_string());
    data.insert("access_key_name".to_string(), access_key_name.to_string());
    data.insert("secret_key_name".to_string(), secret_key_name.to_string());
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(format!("{storage_name}-info-config-map")),
            namespace: Some(namespace.to_string()),
            labels: Some(configmap_labels),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn process_storage_create(
    client: &Client,
    publisher: &FeedbackPublisher,
    project_storage_id: Uuid,
    project_name: &str,
    storage_name: &str,
    secret_name: &str,
    bucket_url: &str,
    access_key_name: &str,
    secret_key_name: &str,
) -> Result<()> {
    tracing::info!(%storage_name, "project s3 storage create handler received message");
    let configmap = build_storage_configmap(
        storage_name,
        project_name,
        bucket_url,
        project_storage_id,
        secret_name,
        access_key_name,
        secret_key_name,
    );
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), project_name);
    if let Err(err) = api.create(&PostParams::default(), &configmap).await {
        tracing::error!(%storage_name, ?err, "failed to create storage configmap");
        publish_status(
            publisher,
            project_storage_id,
            ConfigMapStatus::Failed,
            format!("Failed to create ConfigMap: {err}"),
        )
        .await;
    }
    Ok(())
}

pub async fn process_storage_delete(
    client: &Client,
    publisher: &FeedbackPublisher,
    project_storage_id: Uuid,
    project_name: &str,
) -> Result<()> {
    tracing::info!(%project_storage_id, "project storage delete handler received message");
    let label_selector = format!("{}={}", labels::PROJECT_STORAGE_ID, project_storage_id);

    let outcome = match kube_util::delete_by_label(
        client,
        &label_selector,
        &["ConfigMap"],
        Some(project_name),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            publish_status(
                publisher,
                project_storage_id,
                ConfigMapStatus::Failed,
                format!("Error deleting ConfigMap with label '{label_selector}': {err}"),
            )
            .await;
            return Ok(());
        }
    };

    for failure in &outcome.failures {
        publish_status(
            publisher,
            project_storage_id,
            ConfigMapStatus::Failed,
            format!(
                "Deletion failed for resource {} {}: {}",
                failure.kind,
                failure.object.name_any(),
                failure.error
            ),
        )
        .await;
    }

    if !outcome.deleted_any {
        tracing::warn!(%label_selector, "no ConfigMaps found for deletion");
        publish_status(
            publisher,
            project_storage_id,
            ConfigMapStatus::Deleted,
            format!("No ConfigMaps found for deletion: {label_selector}"),
        )
        .await;
    }
    Ok(())
}

pub fn spawn_storage_watcher(
    client: &Client,
    publisher: &Arc<FeedbackPublisher>,
    registry: &WatcherRegistry,
    cancel: &CancellationToken,
    tasks: &mut Vec<tokio::task::JoinHandle<()>>,
) {
    let api: Api<ConfigMap> = Api::all(client.clone());
    let config = watcher::Config::default().labels(labels::PROJECT_STORAGE_ID);
    let registry = registry.clone();
    let cancel = cancel.clone();
    let publisher = publisher.clone();
    tasks.push(tokio::spawn(async move {
        run_watcher(
            "storage_configmap_watcher",
            api,
            config,
            registry,
            cancel,
            |event, configmap: ConfigMap| {
                let publisher = publisher.clone();
                async move {
                    let Some(id) = configmap
                        .labels()
                        .get(labels::PROJECT_STORAGE_ID)
                        .and_then(|v| Uuid::parse_str(v).ok())
                    else {
                        return;
                    };
                    let (status, reason) = match event {
                        WatchEvent::Applied => (
                            ConfigMapStatus::Added,
                            "Resource has been added to the cluster".to_string(),
                        ),
                        WatchEvent::Deleted => (
                            ConfigMapStatus::Deleted,
                            "Resource has been deleted from the cluster".to_string(),
                        ),
                    };
                    publish_status(&publisher, id, status, reason).await;
                }
            },
        )
        .await;
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configmap_carries_bucket_details_and_label() {
        let id = Uuid::new_v4();
        let configmap = build_storage_configmap(
            "datasets",
            "team-a",
            "s3://bucket/datasets",
            id,
            "s3-creds",
            "AWS_ACCESS_KEY_ID",
            "AWS_SECRET_ACCESS_KEY",
        );
        assert_eq!(
            configmap.metadata.name.as_deref(),
            Some("datasets-info-config-map")
        );
        let data = configmap.data.unwrap();
        assert_eq!(data["bucket_url"], "s3://bucket/datasets");
        assert_eq!(data["secret_name"], "s3-creds");
        assert_eq!(
            configmap.metadata.labels.unwrap()[labels::PROJECT_STORAGE_ID],
            id.to_string()
        );
    }
}
