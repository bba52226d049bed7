//! Project namespace creation, deletion and status watching.

use anyhow::Result;
use chrono::Utc;
use gantry_common::labels;
use gantry_common::messages::{Message, NamespaceStatus};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{DeleteParams, ObjectMeta, PostParams};
use kube::{Api, Client, ResourceExt};
use kube::runtime::watcher;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::publisher::FeedbackPublisher;
use crate::watch::{WatchEvent, WatcherRegistry, run_watcher};

pub fn build_namespace(name: &str, project_id: Uuid) -> Namespace {
    let mut namespace_labels = BTreeMap::new();
    namespace_labels.insert(labels::PROJECT_ID.to_string(), project_id.to_string());
    namespace_labels.insert(labels::QUEUE_MANAGED.to_string(), "true".to_string());
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(namespace_labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn publish_status(
    publisher: &FeedbackPublisher,
    project_id: Uuid,
    status: NamespaceStatus,
    reason: String,
) {
    let message = Message::ProjectNamespaceStatus {
        project_id,
        status,
        status_reason: Some(reason),
        updated_at: Utc::now(),
    };
    if let Err(err) = publisher.publish(&message).await {
        tracing::error!(?err, "failed to publish namespace status");
    }
}

pub async fn process_namespace_create(
    client: &Client,
    publisher: &FeedbackPublisher,
    name: &str,
    project_id: Uuid,
) -> Result<()> {
    tracing::info!(%name, "project namespace create handler received message");
    let api: Api<Namespace> = Api::all(client.clone());
    match api
        .create(&PostParams::default(), &build_namespace(name, project_id))
        .await
    {
        Ok(_) => tracing::info!(%name, "created namespace"),
        Err(err) => {
            tracing::error!(%name, ?err, "failed to create namespace");
            publish_status(
                publisher,
                project_id,
                NamespaceStatus::Failed,
                format!("Failed to create namespace: {err}"),
            )
            .await;
        }
    }
    Ok(())
}

/// Delete only namespaces we actually manage for this project; a missing
/// namespace or foreign labels count as already deleted.
pub async fn process_namespace_delete(
    client: &Client,
    publisher: &FeedbackPublisher,
    name: &str,
    project_id: Uuid,
) -> Result<()> {
    tracing::info!(%name, "project namespace delete handler received message");
    let api: Api<Namespace> = Api::all(client.clone());

    let namespace = match api.get(name).await {
        Ok(namespace) => namespace,
        Err(kube::Error::Api(err)) if err.code == 404 => {
            publish_status(
                publisher,
                project_id,
                NamespaceStatus::Deleted,
                "Project namespace not found".into(),
            )
            .await;
            return Ok(());
        }
        Err(err) => {
            publish_status(
                publisher,
                project_id,
                NamespaceStatus::DeleteFailed,
                format!("Failed to delete namespace: {err}"),
            )
            .await;
            return Ok(());
        }
    };

    let owner = namespace.labels().get(labels::PROJECT_ID);
    if owner.map(String::as_str) != Some(&project_id.to_string()) {
        publish_status(
            publisher,
            project_id,
            NamespaceStatus::Deleted,
            "Project namespace not found".into(),
        )
        .await;
        return Ok(());
    }

    if let Err(err) = api.delete(name, &DeleteParams::default()).await {
        tracing::error!(%name, ?err, "failed to delete namespace");
        publish_status(
            publisher,
            project_id,
            NamespaceStatus::DeleteFailed,
            format!("Failed to delete namespace: {err}"),
        )
        .await;
    } else {
        tracing::info!(%name, "deleted namespace");
    }
    Ok(())
}

fn namespace_phase_status(event: WatchEvent, namespace: &Namespace) -> (NamespaceStatus, String) {
    if event == WatchEvent::Deleted {
        return (NamespaceStatus::Deleted, "Namespace has been deleted".into());
    }
    match namespace
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
    {
        Some("Active") => (NamespaceStatus::Active, "Namespace is active".into()),
        Some("Terminating") => (
            NamespaceStatus::Terminating,
            "Namespace is terminating".into(),
        ),
        phase => (
            NamespaceStatus::Failed,
            format!("Unknown namespace phase: {}", phase.unwrap_or("none")),
        ),
    }
}

pub fn spawn_namespace_watcher(
    client: &Client,
    publisher: &Arc<FeedbackPublisher>,
    registry: &WatcherRegistry,
    cancel: &CancellationToken,
    tasks: &mut Vec<tokio::task::JoinHandle<()>>,
) {
    let api: Api<Namespace> = Api::all(client.clone());
    let config = watcher::Config::default().labels(&format!(
        "{},{}=true",
        labels::PROJECT_ID,
        labels::QUEUE_MANAGED
    ));
    let registry = registry.clone();
    let cancel = cancel.clone();
    let publisher = publisher.clone();
    tasks.push(tokio::spawn(async move {
        run_watcher(
            "namespace_watcher",
            api,
            config,
            registry,
            cancel,
            |event, namespace: Namespace| {
                let publisher = publisher.clone();
                async move {
                    let Some(project_id) = namespace
                        .labels()
                        .get(labels::PROJECT_ID)
                        .and_then(|v| Uuid::parse_str(v).ok())
                    else {
                        return;
                    };
                    let (status, reason) = namespace_phase_status(event, &namespace);
                    publish_status(&publisher, project_id, status, reason).await;
                }
            },
        )
        .await;
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::NamespaceStatus as K8sNamespaceStatus;

    fn namespace_with_phase(phase: &str) -> Namespace {
        Namespace {
            status: Some(K8sNamespaceStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn namespace_manifest_carries_management_labels() {
        let project_id = Uuid::new_v4();
        let namespace = build_namespace("test-a", project_id);
        let namespace_labels = namespace.metadata.labels.unwrap();
        assert_eq!(
            namespace_labels.get(labels::PROJECT_ID),
            Some(&project_id.to_string())
        );
        assert_eq!(namespace_labels.get(labels::QUEUE_MANAGED), Some(&"true".to_string()));
    }

    #[test]
    fn phase_mapping() {
        assert_eq!(
            namespace_phase_status(WatchEvent::Applied, &namespace_with_phase("Active")).0,
            NamespaceStatus::Active
        );
        assert_eq!(
            namespace_phase_status(WatchEvent::Applied, &namespace_with_phase("Terminating")).0,
            NamespaceStatus::Terminating
        );
        assert_eq!(
            namespace_phase_status(WatchEvent::Applied, &namespace_with_phase("Odd")).0,
            NamespaceStatus::Failed
        );
        assert_eq!(
            namespace_phase_status(WatchEvent::Deleted, &namespace_with_phase("Active")).0,
            NamespaceStatus::Deleted
        );
    }
}
