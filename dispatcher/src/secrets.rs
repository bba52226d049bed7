//! Project secret materialization and status watching.

use anyhow::Result;
use chrono::Utc;
use gantry_common::labels;
use gantry_common::messages::{AssignmentStatus, Message, SecretComponentKind};
use k8s_openapi::api::core::v1::Secret;
use kube::api::DynamicObject;
use kube::{Api, Client, ResourceExt};
use kube::runtime::watcher;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::kube_util;
use crate::publisher::FeedbackPublisher;
use crate::watch::{WatchEvent, WatcherRegistry, run_watcher};

pub const EXTERNAL_SECRETS_API_GROUP: &str = "external-secrets.io";
pub const EXTERNAL_SECRETS_PLURAL: &str = "externalsecrets";

async fn publish_status(
    publisher: &FeedbackPublisher,
    project_secret_id: Uuid,
    status: AssignmentStatus,
    reason: String,
) {
    let message = Message::ProjectSecretsUpdate {
        project_secret_id,
        status,
        status_reason: Some(reason),
        updated_at: Utc::now(),
    };
    if let Err(err) = publisher.publish(&message).await {
        tracing::error!(?err, "failed to publish project secret status");
    }
}

/// Rewrite the manifest for its target project: name, namespace and the
/// assignment label, preserving any labels/annotations it already carries.
pub fn patch_secret_manifest(
    manifest: &serde_json::Value,
    namespace: &str,
    secret_name: &str,
    project_secret_id: Uuid,
) -> serde_json::Value {
    let mut patched = manifest.clone();
    let existing_metadata = patched.get("metadata").cloned().unwrap_or(serde_json::json!({}));

    let mut metadata = serde_json::Map::new();
    metadata.insert("name".into(), serde_json::json!(secret_name));
    metadata.insert("namespace".into(), serde_json::json!(namespace));
    if let Some(annotations) = existing_metadata.get("annotations") {
        metadata.insert("annotations".into(), annotations.clone());
    }
    let mut patched_labels = existing_metadata
        .get("labels")
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    patched_labels.insert(
        labels::PROJECT_SECRET_ID.into(),
        serde_json::json!(project_secret_id.to_string()),
    );
    metadata.insert("labels".into(), serde_json::Value::Object(patched_labels));

    patched["metadata"] = serde_json::Value::Object(metadata);
    patched
}

pub async fn process_project_secrets_create(
    client: &Client,
    publisher: &FeedbackPublisher,
    project_secret_id: Uuid,
    project_name: &str,
    secret_name: &str,
    manifest: &str,
    secret_type: SecretComponentKind,
) -> Result<()> {
    tracing::info!(%project_secret_id, "project secrets create handler received message");

    let parsed: serde_yaml::Value = match serde_yaml::from_str(manifest) {
        Ok(value) => value,
        Err(err) => {
            publish_status(
                publisher,
                project_secret_id,
                AssignmentStatus::Failed,
                format!("Invalid manifest (secret_type={secret_type:?}): {err}"),
            )
            .await;
            return Ok(());
        }
    };
    let as_json = match serde_json::to_value(&parsed) {
        Ok(value) => value,
        Err(err) => {
            publish_status(
                publisher,
                project_secret_id,
                AssignmentStatus::Failed,
                format!("Invalid manifest (secret_type={secret_type:?}): {err}"),
            )
            .await;
            return Ok(());
        }
    };

    let expected_kind = match secret_type {
        SecretComponentKind::ExternalSecret => "ExternalSecret",
        SecretComponentKind::KubernetesSecret => "Secret",
    };
    if as_json.get("kind").and_then(|k| k.as_str()) != Some(expected_kind) {
        publish_status(
            publisher,
            project_secret_id,
            AssignmentStatus::Failed,
            format!("Manifest kind does not match secret_type={secret_type:?}"),
        )
        .await;
        return Ok(());
    }

    let patched = patch_secret_manifest(&as_json, project_name, secret_name, project_secret_id);
    if let Err(err) = kube_util::apply_resource(client, &patched).await {
        tracing::error!(?err, "failed to create secret");
        publish_status(
            publisher,
            project_secret_id,
            AssignmentStatus::Failed,
            format!("Failed to create secret: {err}"),
        )
        .await;
    }
    Ok(())
}

pub async fn process_project_secrets_delete(
    client: &Client,
    publisher: &FeedbackPublisher,
    project_secret_id: Uuid,
    project_name: &str,
    secret_type: SecretComponentKind,
) -> Result<()> {
    tracing::info!(%project_secret_id, "project secrets delete handler received message");
    let label_selector = format!("{}={}", labels::PROJECT_SECRET_ID, project_secret_id);
    let allowed_kinds = match secret_type {
        SecretComponentKind::ExternalSecret => ["ExternalSecret"],
        SecretComponentKind::KubernetesSecret => ["Secret"],
    };

    let outcome =
        match kube_util::delete_by_label(client, &label_selector, &allowed_kinds, Some(project_name))
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                publish_status(
                    publisher,
                    project_secret_id,
                    AssignmentStatus::DeleteFailed,
                    format!("Error deleting project secret resources with label '{label_selector}': {err}"),
                )
                .await;
                return Ok(());
            }
        };

    for failure in &outcome.failures {
        publish_status(
            publisher,
            project_secret_id,
            AssignmentStatus::DeleteFailed,
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
        tracing::warn!(%label_selector, "no resources found for deletion");
        publish_status(
            publisher,
            project_secret_id,
            AssignmentStatus::Deleted,
            format!("No resources found for deletion: {label_selector}"),
        )
        .await;
    }
    Ok(())
}

fn assignment_id(object_labels: &BTreeMap<String, String>) -> Option<Uuid> {
    object_labels
        .get(labels::PROJECT_SECRET_ID)
        .and_then(|v| Uuid::parse_str(v).ok())
}

/// ExternalSecrets expose a Ready condition; map it onto the assignment.
pub fn status_for_external_secret(
    event: WatchEvent,
    object: &DynamicObject,
) -> (Option<AssignmentStatus>, String) {
    if event == WatchEvent::Deleted {
        return (
            Some(AssignmentStatus::Deleted),
            "Resource has been removed from the cluster".into(),
        );
    }
    let conditions = object
        .data
        .pointer("/status/conditions")
        .and_then(|v| v.as_array());
    if let Some(conditions) = conditions {
        for condition in conditions {
            if condition.get("type").and_then(|v| v.as_str()) != Some("Ready") {
                continue;
            }
            let message = condition
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let reason = condition
                .get("reason")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            return match condition.get("status").and_then(|v| v.as_str()) {
                Some("True") => (
                    Some(AssignmentStatus::Synced),
                    message.unwrap_or_else(|| "Secret is ready".into()),
                ),
                Some("False") => (
                    Some(AssignmentStatus::SyncedError),
                    message.or(reason).unwrap_or_else(|| "Secret is not ready".into()),
                ),
                _ => (
                    Some(AssignmentStatus::Unknown),
                    message.unwrap_or_else(|| "Secret readiness is unknown".into()),
                ),
            };
        }
    }
    (None, "Secret status could not be determined".into())
}

pub fn status_for_kubernetes_secret(event: WatchEvent) -> (AssignmentStatus, String) {
    match event {
        WatchEvent::Deleted => (
            AssignmentStatus::Deleted,
            "Secret has been deleted from the cluster".into(),
        ),
        WatchEvent::Applied => (
            AssignmentStatus::Synced,
            "Secret is present in the cluster".into(),
        ),
    }
}

pub async fn spawn_secret_watchers(
    client: &Client,
    publisher: &Arc<FeedbackPublisher>,
    registry: &WatcherRegistry,
    cancel: &CancellationToken,
    tasks: &mut Vec<tokio::task::JoinHandle<()>>,
) -> Result<()> {
    // Plain Kubernetes secrets, filtered to the ones we manage.
    {
        let api: Api<Secret> = Api::all(client.clone());
        let config = watcher::Config::default().labels(labels::PROJECT_SECRET_ID);
        let registry = registry.clone();
        let cancel = cancel.clone();
        let publisher = publisher.clone();
        tasks.push(tokio::spawn(async move {
            run_watcher(
                "kubernetes_secret_watcher",
                api,
                config,
                registry,
                cancel,
                |event, secret: Secret| {
                    let publisher = publisher.clone();
                    async move {
                        let Some(id) = assignment_id(secret.labels()) else {
                            return;
                        };
                        let (status, reason) = status_for_kubernetes_secret(event);
                        publish_status(&publisher, id, status, reason).await;
                    }
                },
            )
            .await;
        }));
    }

    // ExternalSecrets, when the operator is installed.
    if let Some(resource) =
        kube_util::resolve_api_resource(client, EXTERNAL_SECRETS_API_GROUP, EXTERNAL_SECRETS_PLURAL)
            .await?
    {
        let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
        let config = watcher::Config::default().labels(labels::PROJECT_SECRET_ID);
        let registry = registry.clone();
        let cancel = cancel.clone();
        let publisher = publisher.clone();
        tasks.push(tokio::spawn(async move {
            run_watcher(
                "external_secret_watcher",
                api,
                config,
                registry,
                cancel,
                |event, object: DynamicObject| {
                    let publisher = publisher.clone();
                    async move {
                        let Some(id) = assignment_id(object.labels()) else {
                            tracing::warn!(
                                name = %object.name_any(),
                                "external secret without assignment label"
                            );
                            return;
                        };
                        let (status, reason) = status_for_external_secret(event, &object);
                        if let Some(status) = status {
                            publish_status(&publisher, id, status, reason).await;
                        }
                    }
                },
            )
            .await;
        }));
    } else {
        tracing::warn!("ExternalSecret CRD not installed, skipping watcher");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patching_sets_identity_and_keeps_existing_labels() {
        let manifest = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": "original",
                "namespace": "wrong",
                "labels": {"airm.silogen.com/use-case": "hugging_face"},
            },
            "stringData": {"token": "t"},
        });
        let id = Uuid::new_v4();
        let patched = patch_secret_manifest(&manifest, "team-a", "hf-token", id);
        assert_eq!(patched["metadata"]["name"], "hf-token");
        assert_eq!(patched["metadata"]["namespace"], "team-a");
        assert_eq!(
            patched["metadata"]["labels"][labels::PROJECT_SECRET_ID],
            id.to_string()
        );
        assert_eq!(
            patched["metadata"]["labels"]["airm.silogen.com/use-case"],
            "hugging_face"
        );
    }

    #[test]
    fn external_secret_ready_condition_mapping() {
        let object = |status: &str| DynamicObject {
            types: None,
            metadata: Default::default(),
            data: serde_json::json!({
                "status": {"conditions": [{"type": "Ready", "status": status, "message": "m"}]}
            }),
        };
        assert_eq!(
            status_for_external_secret(WatchEvent::Applied, &object("True")).0,
            Some(AssignmentStatus::Synced)
        );
        assert_eq!(
            status_for_external_secret(WatchEvent::Applied, &object("False")).0,
            Some(AssignmentStatus::SyncedError)
        );
        assert_eq!(
            status_for_external_secret(WatchEvent::Applied, &object("Unknown")).0,
            Some(AssignmentStatus::Unknown)
        );
        assert_eq!(
            status_for_external_secret(WatchEvent::Deleted, &object("True")).0,
            Some(AssignmentStatus::Deleted)
        );
    }
}
