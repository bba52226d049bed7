//! Workload reconciliation: manifest application, cascade deletes and the
//! per-kind status watchers.

use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;
use gantry_common::labels;
use gantry_common::messages::{ComponentStatus, Message, WorkloadComponentKind, WorkloadStatus};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
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

pub const KAIWO_API_GROUP: &str = "kaiwo.silogen.ai";
pub const KAIWO_JOB_PLURAL: &str = "kaiwojobs";
pub const KAIWO_SERVICE_PLURAL: &str = "kaiwoservices";
pub const AIM_API_GROUP: &str = "aim.silogen.ai";
pub const AIM_SERVICE_PLURAL: &str = "aimservices";
pub const HTTPROUTE_API_GROUP: &str = "gateway.networking.k8s.io";
pub const HTTPROUTE_PLURAL: &str = "httproutes";

const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";
const OIDC_USER_PREFIX: &str = "oidc";
const SUBMITTER_MAX_LENGTH: usize = 100;

/// Identity of a workload component, recovered from its labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentIdentity {
    pub workload_id: Uuid,
    pub component_id: Uuid,
    pub project_id: Uuid,
    pub auto_discovered: bool,
    pub submitter: Option<String>,
}

pub fn extract_identity(
    object_labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> Option<ComponentIdentity> {
    let parse = |key: &str| object_labels.get(key).and_then(|v| Uuid::parse_str(v).ok());
    let submitter = annotations.get(labels::SUBMITTER_ANNOTATION).map(|raw| {
        let mut value = raw.as_str();
        value = value.strip_prefix(SERVICE_ACCOUNT_PREFIX).unwrap_or(value);
        value = value.strip_prefix(OIDC_USER_PREFIX).unwrap_or(value);
        value.chars().take(SUBMITTER_MAX_LENGTH).collect()
    });
    Some(ComponentIdentity {
        workload_id: parse(labels::WORKLOAD_ID)?,
        component_id: parse(labels::COMPONENT_ID)?,
        project_id: parse(labels::PROJECT_ID)?,
        auto_discovered: annotations
            .get(labels::AUTO_DISCOVERED_ANNOTATION)
            .is_some_and(|v| v == "true"),
        submitter,
    })
}

// ---------------------------------------------------------------------------
// Per-kind status maps. Each returns None when no status can be derived.

pub fn status_for_job(job: &Job) -> (Option<ComponentStatus>, String) {
    let spec = job.spec.as_ref();
    let status = job.status.as_ref();

    if spec.and_then(|s| s.suspend).unwrap_or(false) {
        return (Some(ComponentStatus::Suspended), "Job is currently suspended".into());
    }
    let active = status.and_then(|s| s.active).unwrap_or(0);
    if active > 0 {
        return (Some(ComponentStatus::Running), "Job is actively running".into());
    }
    let succeeded = status.and_then(|s| s.succeeded).unwrap_or(0);
    let completions = spec.and_then(|s| s.completions).unwrap_or(1);
    if succeeded >= completions {
        return (
            Some(ComponentStatus::Complete),
            "Job has completed all desired pods successfully".into(),
        );
    }
    let failed = status.and_then(|s| s.failed).unwrap_or(0);
    if failed > 0 {
        return (Some(ComponentStatus::Failed), "Job has failed".into());
    }
    (Some(ComponentStatus::Pending), "Job has not started yet".into())
}

pub fn status_for_deployment(deployment: &Deployment) -> (Option<ComponentStatus>, String) {
    let Some(status) = deployment.status.as_ref() else {
        return (None, "Deployment status is missing".into());
    };
    let ready = status.ready_replicas.unwrap_or(0);
    let replicas = status.replicas.unwrap_or(0);
    if ready == 0 {
        (Some(ComponentStatus::Pending), "No replicas are ready".into())
    } else if ready < replicas {
        (
            Some(ComponentStatus::Pending),
            format!("Scaling up: {ready} ready of {replicas} total"),
        )
    } else {
        (Some(ComponentStatus::Running), "All replicas are running".into())
    }
}

pub fn status_for_stateful_set(set: &StatefulSet) -> (Option<ComponentStatus>, String) {
    let replicas = set.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
    let status = set.status.as_ref();
    let ready = status.map(|s| s.ready_replicas.unwrap_or(0)).unwrap_or(0);
    let current = status.map(|s| s.current_replicas.unwrap_or(0)).unwrap_or(0);
    let available = status.map(|s| s.available_replicas.unwrap_or(0)).unwrap_or(0);

    if replicas == 0 {
        return (
            Some(ComponentStatus::Pending),
            "StatefulSet has no replicas defined".into(),
        );
    }
    if current < replicas {
        return (
            Some(ComponentStatus::Pending),
            format!("StatefulSet is scaling up ({current}/{replicas} replicas)"),
        );
    }
    if ready == replicas && available == replicas {
        return (
            Some(ComponentStatus::Running),
            format!("StatefulSet is ready ({ready}/{replicas} replicas)"),
        );
    }
    if current > 0 {
        return (
            Some(ComponentStatus::Pending),
            format!("StatefulSet partially ready ({ready}/{replicas} ready)"),
        );
    }
    (None, "StatefulSet status could not be determined".into())
}

pub fn status_for_daemon_set(set: &DaemonSet) -> (Option<ComponentStatus>, String) {
    let Some(status) = set.status.as_ref() else {
        return (None, "DaemonSet status is missing".into());
    };
    let desired = status.desired_number_scheduled;
    let current = status.current_number_scheduled;
    let ready = status.number_ready;
    let available = status.number_available.unwrap_or(0);

    if current == 0 {
        return (
            Some(ComponentStatus::Pending),
            "DaemonSet has no current pods scheduled".into(),
        );
    }
    if ready == desired && available == desired && current == desired {
        return (
            Some(ComponentStatus::Running),
            format!("DaemonSet is ready ({ready}/{desired} pods ready)"),
        );
    }
    if ready > 0 {
        return (
            Some(ComponentStatus::Pending),
            format!("DaemonSet partially ready ({ready}/{desired} pods ready)"),
        );
    }
    (
        Some(ComponentStatus::Pending),
        format!("DaemonSet pods starting ({current}/{desired} scheduled)"),
    )
}

pub fn status_for_pod(pod: &Pod) -> (Option<ComponentStatus>, String) {
    match pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
        Some("Pending") => (
            Some(ComponentStatus::Pending),
            "Pod is pending scheduling or initialization".into(),
        ),
        Some("Running") => (Some(ComponentStatus::Running), "Pod is running".into()),
        Some("Succeeded") => (
            Some(ComponentStatus::Complete),
            "Pod completed successfully".into(),
        ),
        Some("Failed") => (Some(ComponentStatus::Failed), "Pod has failed".into()),
        _ => (None, "Status information could not be determined".into()),
    }
}

pub fn status_for_service(service: &Service) -> (Option<ComponentStatus>, String) {
    let Some(spec) = service.spec.as_ref() else {
        return (Some(ComponentStatus::Invalid), "Service has no spec".into());
    };
    if spec.ports.as_ref().is_none_or(|p| p.is_empty()) {
        return (
            Some(ComponentStatus::Invalid),
            "Service has no defined ports".into(),
        );
    }
    if spec.selector.as_ref().is_none_or(|s| s.is_empty()) {
        return (
            Some(ComponentStatus::Invalid),
            "Service has no selector defined".into(),
        );
    }
    if spec.type_.as_deref() == Some("LoadBalancer") {
        let has_ingress = service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .is_some_and(|ingress| !ingress.is_empty());
        if has_ingress {
            return (
                Some(ComponentStatus::Ready),
                "LoadBalancer is provisioned with ingress".into(),
            );
        }
        return (
            Some(ComponentStatus::Pending),
            "Waiting for LoadBalancer ingress".into(),
        );
    }
    (Some(ComponentStatus::Ready), "Service is configured properly".into())
}

pub fn status_for_cron_job(cron_job: &CronJob) -> (Option<ComponentStatus>, String) {
    if cron_job.spec.as_ref().and_then(|s| s.suspend).unwrap_or(false) {
        return (
            Some(ComponentStatus::Suspended),
            "CronJob is currently suspended".into(),
        );
    }
    let active = cron_job
        .status
        .as_ref()
        .and_then(|s| s.active.as_ref())
        .map(|a| a.len())
        .unwrap_or(0);
    if active > 0 {
        return (
            Some(ComponentStatus::Running),
            format!("CronJob has {active} active job(s) running"),
        );
    }
    (
        Some(ComponentStatus::Ready),
        "CronJob is scheduled but hasn't run yet".into(),
    )
}

/// Kaiwo and AIM custom resources expose a `status.status` string matching
/// the component status enum.
pub fn status_for_status_passthrough(object: &DynamicObject) -> (Option<ComponentStatus>, String) {
    let value = object
        .data
        .pointer("/status/status")
        .and_then(|v| v.as_str());
    match value.and_then(|v| {
        serde_json::from_value::<ComponentStatus>(serde_json::Value::String(v.to_string())).ok()
    }) {
        Some(status) => (Some(status), format!("Resource status: {value:?}", value = value.unwrap_or(""))),
        None => {
            tracing::warn!(?value, "could not determine status from resource");
            (None, "Status information could not be determined".into())
        }
    }
}

/// ConfigMaps, Ingresses and HTTPRoutes only report presence.
pub fn status_for_presence(event: WatchEvent) -> (Option<ComponentStatus>, String) {
    match event {
        WatchEvent::Applied => (
            Some(ComponentStatus::Added),
            "Resource has been added to the cluster".into(),
        ),
        WatchEvent::Deleted => (
            Some(ComponentStatus::Deleted),
            "Resource has been deleted from the cluster".into(),
        ),
    }
}

// ---------------------------------------------------------------------------
// Message plumbing

fn component_status_message(
    identity: &ComponentIdentity,
    name: &str,
    kind: WorkloadComponentKind,
    api_version: &str,
    status: ComponentStatus,
    status_reason: String,
) -> Message {
    Message::WorkloadComponentStatusUpdate {
        id: identity.component_id,
        workload_id: identity.workload_id,
        name: name.to_string(),
        kind,
        api_version: api_version.to_string(),
        status,
        status_reason: Some(status_reason),
        updated_at: Utc::now(),
    }
}

fn auto_discovered_message(
    identity: &ComponentIdentity,
    name: &str,
    kind: WorkloadComponentKind,
    api_version: &str,
) -> Message {
    Message::AutoDiscoveredWorkloadComponent {
        project_id: identity.project_id,
        workload_id: identity.workload_id,
        component_id: identity.component_id,
        name: name.to_string(),
        kind,
        api_version: api_version.to_string(),
        submitter: identity.submitter.clone(),
        updated_at: Utc::now(),
    }
}

async fn publish_component_event(
    publisher: &FeedbackPublisher,
    object_labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
    name: &str,
    kind: WorkloadComponentKind,
    api_version: &str,
    event: WatchEvent,
    derived: (Option<ComponentStatus>, String),
) {
    let Some(identity) = extract_identity(object_labels, annotations) else {
        tracing::warn!(%name, "component without identity labels, skipping");
        return;
    };

    // Resources created outside the controller announce themselves first so
    // the row exists before its status stream starts.
    if identity.auto_discovered
        && let Err(err) = publisher
            .publish(&auto_discovered_message(&identity, name, kind, api_version))
            .await
    {
        tracing::error!(?err, "failed to publish auto-discovered component");
    }

    let (status, status_reason) = match event {
        WatchEvent::Deleted => (
            Some(ComponentStatus::Deleted),
            "Resource has been removed from the cluster".to_string(),
        ),
        WatchEvent::Applied => derived,
    };

    let Some(status) = status else {
        tracing::info!(%name, "unable to determine a status for event");
        return;
    };
    if let Err(err) = publisher
        .publish(&component_status_message(
            &identity,
            name,
            kind,
            api_version,
            status,
            status_reason,
        ))
        .await
    {
        tracing::error!(?err, "failed to publish component status");
    }
}

// ---------------------------------------------------------------------------
// Inbound handlers

/// Split the manifest stream and create each document; a per-document
/// failure reports CreateFailed for that component and moves on.
pub async fn process_workload_create(
    client: &Client,
    publisher: &FeedbackPublisher,
    manifest: &str,
) -> Result<()> {
    tracing::info!("workload create handler received message");
    let values: Vec<serde_json::Value> = serde_yaml::Deserializer::from_str(manifest)
        .filter_map(|document| match serde_json::Value::deserialize(document) {
            Ok(serde_json::Value::Null) => None,
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!(?err, "invalid manifest document, skipping");
                None
            }
        })
        .collect();
    for value in values {
        if let Err(err) = kube_util::create_resource(client, &value).await {
            tracing::error!(?err, "failed to create manifest");
            report_create_failure(publisher, &value, &format!("Failed to create manifest: {err}"))
                .await;
        }
    }
    Ok(())
}

async fn report_create_failure(
    publisher: &FeedbackPublisher,
    value: &serde_json::Value,
    reason: &str,
) {
    let object_labels = string_map(value.pointer("/metadata/labels"));
    let annotations = string_map(value.pointer("/metadata/annotations"));
    let name = value
        .pointer("/metadata/name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let kind = value
        .get("kind")
        .and_then(|v| v.as_str())
        .and_then(|k| {
            serde_json::from_value::<WorkloadComponentKind>(serde_json::Value::String(k.into())).ok()
        });
    let api_version = value
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let Some(kind) = kind else {
        tracing::warn!(%name, "create failure for unrecognized kind, not reported");
        return;
    };
    let Some(identity) = extract_identity(&object_labels, &annotations) else {
        tracing::warn!(%name, "create failure for unlabeled manifest, not reported");
        return;
    };
    if let Err(err) = publisher
        .publish(&component_status_message(
            &identity,
            name,
            kind,
            api_version,
            ComponentStatus::CreateFailed,
            reason.to_string(),
        ))
        .await
    {
        tracing::error!(?err, "failed to publish create failure");
    }
}

fn string_map(value: Option<&serde_json::Value>) -> BTreeMap<String, String> {
    value
        .and_then(|v| v.as_object())
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Cascade-delete every component of a workload by label. When nothing
/// matched, publish a synthetic Deleted so the controller can advance.
pub async fn process_delete_workload(
    client: &Client,
    publisher: &FeedbackPublisher,
    workload_id: Uuid,
) -> Result<()> {
    tracing::info!(%workload_id, "delete workload handler received message");
    let label_selector = format!("{}={}", labels::WORKLOAD_ID, workload_id);
    let allowed: Vec<&str> = WorkloadComponentKind::ALL
        .iter()
        .map(|k| k.as_kind())
        .collect();

    let outcome = kube_util::delete_by_label(client, &label_selector, &allowed, None).await?;

    for failure in &outcome.failures {
        let object_labels: BTreeMap<String, String> = failure.object.labels().clone();
        let annotations: BTreeMap<String, String> = failure.object.annotations().clone();
        let reason = format!(
            "Deletion failed for resource {} {}: {}",
            failure.kind,
            failure.object.name_any(),
            failure.error
        );
        tracing::error!(%reason);
        if let Some(identity) = extract_identity(&object_labels, &annotations)
            && let Ok(kind) = serde_json::from_value::<WorkloadComponentKind>(
                serde_json::Value::String(failure.kind.clone()),
            )
        {
            let message = component_status_message(
                &identity,
                &failure.object.name_any(),
                kind,
                "",
                ComponentStatus::DeleteFailed,
                reason,
            );
            if let Err(err) = publisher.publish(&message).await {
                tracing::error!(?err, "failed to publish delete failure");
            }
        }
    }

    if !outcome.deleted_any {
        tracing::warn!(%label_selector, "no resources found for deletion");
        publisher
            .publish(&Message::WorkloadStatusUpdate {
                workload_id,
                status: WorkloadStatus::Deleted,
                status_reason: Some(format!("No resources found for deletion: {label_selector}")),
                updated_at: Utc::now(),
            })
            .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Watchers

macro_rules! spawn_typed_watcher {
    ($tasks:expr, $name:expr, $api:expr, $registry:expr, $cancel:expr, $publisher:expr,
     $kind:expr, $api_version:expr, $status_fn:expr) => {{
        let registry = $registry.clone();
        let cancel = $cancel.clone();
        let publisher = $publisher.clone();
        let config =
            watcher::Config::default().labels(labels::WORKLOAD_ID);
        let api = $api;
        $tasks.push(tokio::spawn(async move {
            run_watcher($name, api, config, registry, cancel, |event, obj| {
                let publisher = publisher.clone();
                async move {
                    let derived = match event {
                        WatchEvent::Applied => $status_fn(&obj),
                        WatchEvent::Deleted => (None, String::new()),
                    };
                    publish_component_event(
                        &publisher,
                        obj.labels(),
                        obj.annotations(),
                        &obj.name_any(),
                        $kind,
                        $api_version,
                        event,
                        derived,
                    )
                    .await;
                }
            })
            .await;
        }));
    }};
}

/// Start every workload-component watcher. Custom kinds whose CRDs are not
/// installed are skipped with a warning, matching a cluster that does not
/// run those operators.
pub async fn spawn_workload_watchers(
    client: &Client,
    publisher: &Arc<FeedbackPublisher>,
    registry: &WatcherRegistry,
    cancel: &CancellationToken,
    tasks: &mut Vec<tokio::task::JoinHandle<()>>,
) -> Result<()> {
    use WorkloadComponentKind as Kind;

    spawn_typed_watcher!(
        tasks,
        "job_watcher",
        Api::<Job>::all(client.clone()),
        registry,
        cancel,
        publisher,
        Kind::Job,
        "batch/v1",
        status_for_job
    );
    spawn_typed_watcher!(
        tasks,
        "deployment_watcher",
        Api::<Deployment>::all(client.clone()),
        registry,
        cancel,
        publisher,
        Kind::Deployment,
        "apps/v1",
        status_for_deployment
    );
    spawn_typed_watcher!(
        tasks,
        "stateful_set_watcher",
        Api::<StatefulSet>::all(client.clone()),
        registry,
        cancel,
        publisher,
        Kind::StatefulSet,
        "apps/v1",
        status_for_stateful_set
    );
    spawn_typed_watcher!(
        tasks,
        "daemon_set_watcher",
        Api::<DaemonSet>::all(client.clone()),
        registry,
        cancel,
        publisher,
        Kind::DaemonSet,
        "apps/v1",
        status_for_daemon_set
    );
    spawn_typed_watcher!(
        tasks,
        "pod_watcher",
        Api::<Pod>::all(client.clone()),
        registry,
        cancel,
        publisher,
        Kind::Pod,
        "v1",
        status_for_pod
    );
    spawn_typed_watcher!(
        tasks,
        "service_watcher",
        Api::<Service>::all(client.clone()),
        registry,
        cancel,
        publisher,
        Kind::Service,
        "v1",
        status_for_service
    );
    spawn_typed_watcher!(
        tasks,
        "cron_job_watcher",
        Api::<CronJob>::all(client.clone()),
        registry,
        cancel,
        publisher,
        Kind::CronJob,
        "batch/v1",
        status_for_cron_job
    );

    // Presence-only builtin kinds.
    {
        let registry = registry.clone();
        let cancel = cancel.clone();
        let publisher = publisher.clone();
        let api = Api::<ConfigMap>::all(client.clone());
        let config = watcher::Config::default().labels(labels::WORKLOAD_ID);
        tasks.push(tokio::spawn(async move {
            run_watcher("workload_configmap_watcher", api, config, registry, cancel, |event, obj: ConfigMap| {
                let publisher = publisher.clone();
                async move {
                    publish_component_event(
                        &publisher,
                        obj.labels(),
                        obj.annotations(),
                        &obj.name_any(),
                        Kind::ConfigMap,
                        "v1",
                        event,
                        status_for_presence(event),
                    )
                    .await;
                }
            })
            .await;
        }));
    }
    {
        let registry = registry.clone();
        let cancel = cancel.clone();
        let publisher = publisher.clone();
        let api = Api::<Ingress>::all(client.clone());
        let config = watcher::Config::default().labels(labels::WORKLOAD_ID);
        tasks.push(tokio::spawn(async move {
            run_watcher("ingress_watcher", api, config, registry, cancel, |event, obj: Ingress| {
                let publisher = publisher.clone();
                async move {
                    publish_component_event(
                        &publisher,
                        obj.labels(),
                        obj.annotations(),
                        &obj.name_any(),
                        Kind::Ingress,
                        "networking.k8s.io/v1",
                        event,
                        status_for_presence(event),
                    )
                    .await;
                }
            })
            .await;
        }));
    }

    // Custom kinds via discovery; absent CRDs are skipped.
    let custom = [
        (KAIWO_API_GROUP, KAIWO_JOB_PLURAL, Kind::KaiwoJob, "kaiwo_job_watcher", false),
        (KAIWO_API_GROUP, KAIWO_SERVICE_PLURAL, Kind::KaiwoService, "kaiwo_service_watcher", false),
        (AIM_API_GROUP, AIM_SERVICE_PLURAL, Kind::AimService, "aim_service_watcher", false),
        (HTTPROUTE_API_GROUP, HTTPROUTE_PLURAL, Kind::HttpRoute, "http_route_watcher", true),
    ];
    for (group, plural, kind, watcher_name, presence_only) in custom {
        let Some(resource) = kube_util::resolve_api_resource(client, group, plural).await? else {
            tracing::warn!(group, plural, "custom resource not installed, skipping watcher");
            continue;
        };
        let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
        let api_version = resource.api_version.clone();
        let registry = registry.clone();
        let cancel = cancel.clone();
        let publisher = publisher.clone();
        let config = watcher::Config::default().labels(labels::WORKLOAD_ID);
        tasks.push(tokio::spawn(async move {
            run_watcher(watcher_name, api, config, registry, cancel, |event, obj: DynamicObject| {
                let publisher = publisher.clone();
                let api_version = api_version.clone();
                async move {
                    let derived = if presence_only {
                        status_for_presence(event)
                    } else {
                        status_for_status_passthrough(&obj)
                    };
                    publish_component_event(
                        &publisher,
                        obj.labels(),
                        obj.annotations(),
                        &obj.name_any(),
                        kind,
                        &api_version,
                        event,
                        derived,
                    )
                    .await;
                }
            })
            .await;
        }));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::{JobSpec, JobStatus};
    use k8s_openapi::api::apps::v1::{DeploymentStatus, StatefulSetSpec, StatefulSetStatus};
    use k8s_openapi::api::core::v1::{PodStatus, ServicePort, ServiceSpec};

    fn job(suspend: bool, active: i32, succeeded: i32, failed: i32, completions: i32) -> Job {
        Job {
            spec: Some(JobSpec {
                suspend: Some(suspend),
                completions: Some(completions),
                ..Default::default()
            }),
            status: Some(JobStatus {
                active: Some(active),
                succeeded: Some(succeeded),
                failed: Some(failed),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn job_status_priorities() {
        assert_eq!(status_for_job(&job(true, 1, 0, 0, 1)).0, Some(ComponentStatus::Suspended));
        assert_eq!(status_for_job(&job(false, 2, 0, 0, 1)).0, Some(ComponentStatus::Running));
        assert_eq!(status_for_job(&job(false, 0, 1, 0, 1)).0, Some(ComponentStatus::Complete));
        assert_eq!(status_for_job(&job(false, 0, 0, 1, 1)).0, Some(ComponentStatus::Failed));
        assert_eq!(status_for_job(&job(false, 0, 0, 0, 1)).0, Some(ComponentStatus::Pending));
    }

    #[test]
    fn deployment_ready_counts_decide() {
        let deployment = |ready, replicas| Deployment {
            status: Some(DeploymentStatus {
                ready_replicas: Some(ready),
                replicas: Some(replicas),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            status_for_deployment(&deployment(3, 3)).0,
            Some(ComponentStatus::Running)
        );
        assert_eq!(
            status_for_deployment(&deployment(1, 3)).0,
            Some(ComponentStatus::Pending)
        );
        assert_eq!(
            status_for_deployment(&deployment(0, 3)).0,
            Some(ComponentStatus::Pending)
        );
    }

    #[test]
    fn stateful_set_requires_ready_and_available() {
        let set = |replicas, ready, current, available| StatefulSet {
            spec: Some(StatefulSetSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                ready_replicas: Some(ready),
                current_replicas: Some(current),
                available_replicas: Some(available),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            status_for_stateful_set(&set(2, 2, 2, 2)).0,
            Some(ComponentStatus::Running)
        );
        assert_eq!(
            status_for_stateful_set(&set(2, 2, 2, 1)).0,
            Some(ComponentStatus::Pending)
        );
    }

    #[test]
    fn pod_phase_map() {
        let pod = |phase: &str| Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(status_for_pod(&pod("Running")).0, Some(ComponentStatus::Running));
        assert_eq!(status_for_pod(&pod("Succeeded")).0, Some(ComponentStatus::Complete));
        assert_eq!(status_for_pod(&pod("Failed")).0, Some(ComponentStatus::Failed));
        assert_eq!(status_for_pod(&pod("Unknown")).0, None);
    }

    #[test]
    fn service_integrity_checks_come_first() {
        let service = Service {
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort::default()]),
                selector: None,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(status_for_service(&service).0, Some(ComponentStatus::Invalid));

        let mut selector = std::collections::BTreeMap::new();
        selector.insert("app".to_string(), "x".to_string());
        let lb = Service {
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort::default()]),
                selector: Some(selector),
                type_: Some("LoadBalancer".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(status_for_service(&lb).0, Some(ComponentStatus::Pending));
    }

    #[test]
    fn passthrough_parses_the_status_enum() {
        let mut object = DynamicObject {
            types: None,
            metadata: Default::default(),
            data: serde_json::json!({"status": {"status": "RUNNING"}}),
        };
        assert_eq!(
            status_for_status_passthrough(&object).0,
            Some(ComponentStatus::Running)
        );
        object.data = serde_json::json!({"status": {"status": "SOMETHING_ELSE"}});
        assert_eq!(status_for_status_passthrough(&object).0, None);
    }

    #[test]
    fn identity_requires_all_three_labels() {
        let mut object_labels = BTreeMap::new();
        object_labels.insert(labels::WORKLOAD_ID.to_string(), Uuid::new_v4().to_string());
        object_labels.insert(labels::COMPONENT_ID.to_string(), Uuid::new_v4().to_string());
        assert!(extract_identity(&object_labels, &BTreeMap::new()).is_none());

        object_labels.insert(labels::PROJECT_ID.to_string(), Uuid::new_v4().to_string());
        let identity = extract_identity(&object_labels, &BTreeMap::new()).unwrap();
        assert!(!identity.auto_discovered);
    }

    #[test]
    fn submitter_prefixes_are_stripped() {
        let mut object_labels = BTreeMap::new();
        object_labels.insert(labels::WORKLOAD_ID.to_string(), Uuid::new_v4().to_string());
        object_labels.insert(labels::COMPONENT_ID.to_string(), Uuid::new_v4().to_string());
        object_labels.insert(labels::PROJECT_ID.to_string(), Uuid::new_v4().to_string());
        let mut annotations = BTreeMap::new();
        annotations.insert(
            labels::AUTO_DISCOVERED_ANNOTATION.to_string(),
            "true".to_string(),
        );
        annotations.insert(
            labels::SUBMITTER_ANNOTATION.to_string(),
            "system:serviceaccount:ns:runner".to_string(),
        );
        let identity = extract_identity(&object_labels, &annotations).unwrap();
        assert!(identity.auto_discovered);
        assert_eq!(identity.submitter.as_deref(), Some("ns:runner"));
    }
}
