//! AIM discovery: report every inference-model image on the cluster.

use anyhow::Result;
use chrono::Utc;
use gantry_common::messages::{AimClusterModel, Message};
use kube::api::DynamicObject;
use kube::{Api, Client, Resource, ResourceExt};

use crate::kube_util;
use crate::publisher::FeedbackPublisher;
use crate::workloads::AIM_API_GROUP;

pub const AIM_CLUSTER_MODEL_PLURAL: &str = "aimclustermodels";

/// One AIMClusterModel resource, or None when it is not yet usable (no
/// image, or the image metadata has not been populated).
pub fn process_aim_resource(object: &DynamicObject) -> Option<AimClusterModel> {
    let resource_name = object.meta().name.clone()?;

    let image_reference = object
        .data
        .pointer("/spec/image")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if image_reference.is_empty() {
        tracing::warn!(%resource_name, "AIMClusterModel has no image in spec, skipping");
        return None;
    }

    let labels_value = object.data.pointer("/status/imageMetadata/originalLabels");
    let Some(model_labels) = labels_value.filter(|v| v.as_object().is_some_and(|m| !m.is_empty()))
    else {
        tracing::warn!(
            %resource_name,
            "AIMClusterModel has no image metadata labels yet, skipping"
        );
        return None;
    };

    Some(AimClusterModel {
        resource_name,
        image_reference: image_reference.to_string(),
        labels: model_labels.clone(),
        status: object
            .data
            .pointer("/status/status")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}

/// List every AIMClusterModel and publish the full batch.
pub async fn publish_aim_cluster_models(
    client: &Client,
    publisher: &FeedbackPublisher,
) -> Result<()> {
    let Some(resource) =
        kube_util::resolve_api_resource(client, AIM_API_GROUP, AIM_CLUSTER_MODEL_PLURAL).await?
    else {
        tracing::warn!("AIMClusterModel CRD not found, skipping sync");
        return Ok(());
    };

    let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
    let items = api.list(&Default::default()).await?.items;
    tracing::info!(count = items.len(), "found AIMClusterModel resources");

    let models: Vec<AimClusterModel> = items.iter().filter_map(process_aim_resource).collect();
    tracing::info!(
        valid = models.len(),
        skipped = items.len() - models.len(),
        "processed AIM models"
    );

    publisher
        .publish(&Message::AimClusterModels {
            models,
            synced_at: Utc::now(),
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn aim_object(name: &str, image: &str, with_labels: bool) -> DynamicObject {
        let status = if with_labels {
            serde_json::json!({
                "status": "READY",
                "imageMetadata": {"originalLabels": {"model": "llama"}},
            })
        } else {
            serde_json::json!({"status": "READY"})
        };
        DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            data: serde_json::json!({
                "spec": {"image": image},
                "status": status,
            }),
        }
    }

    #[test]
    fn complete_models_are_reported() {
        let model = process_aim_resource(&aim_object("llama", "registry/llama:1", true)).unwrap();
        assert_eq!(model.image_reference, "registry/llama:1");
        assert_eq!(model.status.as_deref(), Some("READY"));
    }

    #[test]
    fn incomplete_models_are_skipped() {
        assert!(process_aim_resource(&aim_object("no-image", "", true)).is_none());
        assert!(process_aim_resource(&aim_object("no-labels", "registry/x:1", false)).is_none());
    }
}
