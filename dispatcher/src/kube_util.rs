//! Dynamic-client plumbing: kind discovery, manifest application and
//! label-selected cascade deletes.

use anyhow::{Context, Result, anyhow};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams, PropagationPolicy};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::Client;

pub const FIELD_MANAGER: &str = "gantry-dispatcher";

/// Resolve the served ApiResource for a custom kind, or None when the CRD is
/// not installed on this cluster.
pub async fn resolve_api_resource(
    client: &Client,
    group: &str,
    plural: &str,
) -> Result<Option<ApiResource>> {
    let discovery = Discovery::new(client.clone())
        .filter(&[group])
        .run()
        .await
        .with_context(|| format!("failed to discover group {group}"))?;
    for api_group in discovery.groups() {
        for (resource, _caps) in api_group.recommended_resources() {
            if resource.plural == plural {
                return Ok(Some(resource));
            }
        }
    }
    Ok(None)
}

fn gvk_of(value: &serde_json::Value) -> Result<GroupVersionKind> {
    let api_version = value
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest is missing apiVersion"))?;
    let kind = value
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest is missing kind"))?;
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    };
    Ok(GroupVersionKind::gvk(group, version, kind))
}

async fn dynamic_api_for(
    client: &Client,
    value: &serde_json::Value,
) -> Result<(Api<DynamicObject>, ApiResource)> {
    let gvk = gvk_of(value)?;
    let (resource, caps): (ApiResource, ApiCapabilities) =
        kube::discovery::pinned_kind(client, &gvk)
            .await
            .with_context(|| format!("unknown kind {}/{}", gvk.group, gvk.kind))?;
    let namespace = value
        .pointer("/metadata/namespace")
        .and_then(|v| v.as_str());
    let api = match (caps.scope, namespace) {
        (Scope::Namespaced, Some(ns)) => {
            Api::namespaced_with(client.clone(), ns, &resource)
        }
        (Scope::Namespaced, None) => Api::default_namespaced_with(client.clone(), &resource),
        (Scope::Cluster, _) => Api::all_with(client.clone(), &resource),
    };
    Ok((api, resource))
}

/// Create one manifest document.
pub async fn create_resource(client: &Client, value: &serde_json::Value) -> Result<()> {
    let (api, _resource) = dynamic_api_for(client, value).await?;
    let object: DynamicObject =
        serde_json::from_value(value.clone()).context("manifest is not a valid object")?;
    api.create(&PostParams::default(), &object)
        .await
        .with_context(|| format!("failed to create {}", object.name_any()))?;
    Ok(())
}

/// Server-side apply one manifest document (used for singleton configs).
pub async fn apply_resource(client: &Client, value: &serde_json::Value) -> Result<()> {
    let (api, _resource) = dynamic_api_for(client, value).await?;
    let name = value
        .pointer("/metadata/name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest is missing metadata.name"))?;
    api.patch(
        name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(value),
    )
    .await
    .with_context(|| format!("failed to apply {name}"))?;
    Ok(())
}

use kube::ResourceExt;

pub struct DeleteFailure {
    pub kind: String,
    pub object: DynamicObject,
    pub error: String,
}

pub struct DeleteOutcome {
    pub deleted_any: bool,
    pub failures: Vec<DeleteFailure>,
}

/// Enumerate namespaced API resources whose kind is allowed, list by the
/// label selector, and foreground-delete every match. Failures are collected
/// per item so the caller can report each one.
pub async fn delete_by_label(
    client: &Client,
    label_selector: &str,
    allowed_kinds: &[&str],
    targeted_namespace: Option<&str>,
) -> Result<DeleteOutcome> {
    let discovery = Discovery::new(client.clone())
        .run()
        .await
        .context("failed to run api discovery")?;

    let mut outcome = DeleteOutcome {
        deleted_any: false,
        failures: Vec::new(),
    };
    let list_params = ListParams::default().labels(label_selector);
    let delete_params = DeleteParams {
        propagation_policy: Some(PropagationPolicy::Foreground),
        ..Default::default()
    };

    for group in discovery.groups() {
        for (resource, caps) in group.recommended_resources() {
            if !allowed_kinds.contains(&resource.kind.as_str()) {
                continue;
            }
            if caps.scope != Scope::Namespaced {
                continue;
            }

            let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
            let items = match api.list(&list_params).await {
                Ok(list) => list.items,
                Err(err) => {
                    tracing::warn!(kind = %resource.kind, ?err, "failed to list resources");
                    continue;
                }
            };

            for item in items {
                let namespace = item.namespace().unwrap_or_default();
                if let Some(target) = targeted_namespace
                    && namespace != target
                {
                    continue;
                }
                outcome.deleted_any = true;
                let name = item.name_any();
                tracing::info!(kind = %resource.kind, %name, %namespace, "deleting resource");
                let namespaced_api: Api<DynamicObject> =
                    Api::namespaced_with(client.clone(), &namespace, &resource);
                if let Err(err) = namespaced_api.delete(&name, &delete_params).await {
                    outcome.failures.push(DeleteFailure {
                        kind: resource.kind.clone(),
                        object: item,
                        error: err.to_string(),
                    });
                }
            }
        }
    }
    Ok(outcome)
}
