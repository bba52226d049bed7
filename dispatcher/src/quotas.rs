//! Quota allocation handling: the full allocation arrives as one message
//! and is applied as the singleton KaiwoQueueConfig custom resource; its
//! status feeds back as applied-quota reports.

use anyhow::Result;
use chrono::Utc;
use gantry_common::messages::{GpuVendor, Message, PriorityClass, QuotaAllocation};
use kube::api::DynamicObject;
use kube::{Api, Client, ResourceExt};
use kube::runtime::watcher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::kube_util;
use crate::publisher::FeedbackPublisher;
use crate::quantity::{parse_cpu_value, parse_memory_value};
use crate::watch::{WatchEvent, WatcherRegistry, run_watcher};
use crate::workloads::KAIWO_API_GROUP;

pub const KAIWO_QUEUE_CONFIG_PLURAL: &str = "kaiwoqueueconfigs";
pub const KAIWO_QUEUE_CONFIG_NAME: &str = "kaiwo";
pub const KAIWO_QUEUE_CONFIG_API_VERSION: &str = "kaiwo.silogen.ai/v1alpha1";

const DEFAULT_FLAVOR_NAME: &str = "default";
const DEFAULT_COHORT_NAME: &str = "kaiwo";
const CPU_RESOURCE: &str = "cpu";
const MEMORY_RESOURCE: &str = "memory";
const EPHEMERAL_STORAGE_RESOURCE: &str = "ephemeral-storage";
const AMD_GPU_RESOURCE: &str = "amd.com/gpu";
const NVIDIA_GPU_RESOURCE: &str = "nvidia.com/gpu";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueResource {
    pub name: String,
    #[serde(rename = "nominalQuota")]
    pub nominal_quota: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flavor {
    pub name: String,
    pub resources: Vec<QueueResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceGroup {
    #[serde(rename = "coveredResources")]
    pub covered_resources: Vec<String>,
    pub flavors: Vec<Flavor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterQueueSpec {
    pub cohort: String,
    #[serde(rename = "flavorFungibility")]
    pub flavor_fungibility: serde_json::Value,
    #[serde(rename = "namespaceSelector")]
    pub namespace_selector: serde_json::Value,
    pub preemption: serde_json::Value,
    #[serde(rename = "queueingStrategy")]
    pub queueing_strategy: String,
    #[serde(rename = "resourceGroups")]
    pub resource_groups: Vec<ResourceGroup>,
    #[serde(rename = "stopPolicy")]
    pub stop_policy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterQueue {
    pub name: String,
    #[serde(default)]
    pub namespaces: Vec<String>,
    pub spec: ClusterQueueSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceFlavor {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadPriorityClass {
    pub metadata: BTreeMap<String, String>,
    pub value: i32,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KaiwoQueueConfigSpec {
    #[serde(rename = "clusterQueues")]
    pub cluster_queues: Vec<ClusterQueue>,
    #[serde(rename = "resourceFlavors")]
    pub resource_flavors: Vec<ResourceFlavor>,
    #[serde(rename = "workloadPriorityClasses", default)]
    pub workload_priority_classes: Vec<WorkloadPriorityClass>,
}

fn gpu_resource_name(vendor: Option<GpuVendor>) -> Option<&'static str> {
    match vendor {
        Some(GpuVendor::Amd) => Some(AMD_GPU_RESOURCE),
        Some(GpuVendor::Nvidia) => Some(NVIDIA_GPU_RESOURCE),
        None => None,
    }
}

/// Translate the allocation into the queue-config CR spec.
pub fn build_queue_config_spec(
    allocations: &[QuotaAllocation],
    gpu_vendor: Option<GpuVendor>,
    priority_classes: &[PriorityClass],
) -> KaiwoQueueConfigSpec {
    let mut covered_resources = vec![
        CPU_RESOURCE.to_string(),
        MEMORY_RESOURCE.to_string(),
        EPHEMERAL_STORAGE_RESOURCE.to_string(),
    ];
    if let Some(gpu) = gpu_resource_name(gpu_vendor) {
        covered_resources.push(gpu.to_string());
    }

    let cluster_queues = allocations
        .iter()
        .map(|allocation| {
            let mut resources = vec![
                QueueResource {
                    name: CPU_RESOURCE.into(),
                    nominal_quota: format!("{}m", allocation.cpu_milli_cores),
                },
                QueueResource {
                    name: MEMORY_RESOURCE.into(),
                    nominal_quota: allocation.memory_bytes.to_string(),
                },
                QueueResource {
                    name: EPHEMERAL_STORAGE_RESOURCE.into(),
                    nominal_quota: allocation.ephemeral_storage_bytes.to_string(),
                },
            ];
            if let Some(gpu) = gpu_resource_name(gpu_vendor) {
                resources.push(QueueResource {
                    name: gpu.into(),
                    nominal_quota: allocation.gpu_count.to_string(),
                });
            }
            ClusterQueue {
                name: allocation.quota_name.clone(),
                namespaces: allocation.namespaces.clone(),
                spec: ClusterQueueSpec {
                    cohort: DEFAULT_COHORT_NAME.into(),
                    flavor_fungibility: serde_json::json!({
                        "whenCanBorrow": "Borrow",
                        "whenCanPreempt": "Preempt",
                    }),
                    namespace_selector: serde_json::json!({}),
                    preemption: serde_json::json!({
                        "borrowWithinCohort": {"policy": "Never"},
                        "reclaimWithinCohort": "Any",
                        "withinClusterQueue": "LowerPriority",
                    }),
                    queueing_strategy: "BestEffortFIFO".into(),
                    resource_groups: vec![ResourceGroup {
                        covered_resources: covered_resources.clone(),
                        flavors: vec![Flavor {
                            name: DEFAULT_FLAVOR_NAME.into(),
                            resources,
                        }],
                    }],
                    stop_policy: "None".into(),
                },
            }
        })
        .collect();

    KaiwoQueueConfigSpec {
        cluster_queues,
        resource_flavors: vec![ResourceFlavor {
            name: DEFAULT_FLAVOR_NAME.into(),
        }],
        workload_priority_classes: priority_classes
            .iter()
            .map(|pc| WorkloadPriorityClass {
                metadata: BTreeMap::from([("name".to_string(), pc.name.clone())]),
                value: pc.priority,
                description: format!("Priority class {} with priority {}", pc.name, pc.priority),
            })
            .collect(),
    }
}

/// Read the applied queues back out of the CR.
pub fn queue_config_to_allocations(spec: &KaiwoQueueConfigSpec) -> Vec<QuotaAllocation> {
    let mut allocations = Vec::new();
    for queue in &spec.cluster_queues {
        for group in &queue.spec.resource_groups {
            for flavor in &group.flavors {
                let find = |name: &str| {
                    flavor
                        .resources
                        .iter()
                        .find(|r| r.name == name)
                        .map(|r| r.nominal_quota.as_str())
                };
                let gpu = find(AMD_GPU_RESOURCE)
                    .or_else(|| find(NVIDIA_GPU_RESOURCE))
                    .unwrap_or("0");
                allocations.push(QuotaAllocation {
                    quota_name: queue.name.clone(),
                    cpu_milli_cores: parse_cpu_value(find(CPU_RESOURCE).unwrap_or("0"))
                        .unwrap_or(0),
                    memory_bytes: parse_memory_value(find(MEMORY_RESOURCE).unwrap_or("0"))
                        .unwrap_or(0),
                    ephemeral_storage_bytes: parse_memory_value(
                        find(EPHEMERAL_STORAGE_RESOURCE).unwrap_or("0"),
                    )
                    .unwrap_or(0),
                    gpu_count: gpu.parse().unwrap_or(0),
                    namespaces: queue.namespaces.clone(),
                });
            }
        }
    }
    allocations
}

/// Apply the allocation as the singleton queue config.
pub async fn process_quotas_allocation(
    client: &Client,
    publisher: &FeedbackPublisher,
    allocations: &[QuotaAllocation],
    gpu_vendor: Option<GpuVendor>,
    priority_classes: &[PriorityClass],
) -> Result<()> {
    tracing::info!("cluster quotas allocation handler received message");
    let spec = build_queue_config_spec(allocations, gpu_vendor, priority_classes);
    let manifest = serde_json::json!({
        "apiVersion": KAIWO_QUEUE_CONFIG_API_VERSION,
        "kind": "KaiwoQueueConfig",
        "metadata": {"name": KAIWO_QUEUE_CONFIG_NAME},
        "spec": spec,
    });
    if let Err(err) = kube_util::apply_resource(client, &manifest).await {
        tracing::error!(?err, "failed to apply queue config");
        publish_failure(publisher, Some(format!("Failed to create manifest: {err}"))).await?;
    }
    Ok(())
}

async fn publish_failure(publisher: &FeedbackPublisher, reason: Option<String>) -> Result<()> {
    publisher
        .publish(&Message::ClusterQuotasFailure {
            reason,
            updated_at: Utc::now(),
        })
        .await
}

async fn publish_status(publisher: &FeedbackPublisher, quota_allocations: Vec<QuotaAllocation>) {
    let message = Message::ClusterQuotasStatus {
        quota_allocations,
        updated_at: Utc::now(),
    };
    if let Err(err) = publisher.publish(&message).await {
        tracing::error!(?err, "failed to publish quotas status");
    }
}

async fn process_queue_config_event(
    publisher: &FeedbackPublisher,
    event: WatchEvent,
    object: DynamicObject,
) {
    if event == WatchEvent::Deleted {
        publish_status(publisher, vec![]).await;
        return;
    }
    let status = object
        .data
        .pointer("/status/status")
        .and_then(|v| v.as_str());
    match status {
        Some("READY") => {
            let spec = object
                .data
                .get("spec")
                .cloned()
                .and_then(|spec| serde_json::from_value::<KaiwoQueueConfigSpec>(spec).ok());
            match spec {
                Some(spec) => publish_status(publisher, queue_config_to_allocations(&spec)).await,
                None => tracing::error!(
                    name = %object.name_any(),
                    "queue config is READY but its spec does not parse"
                ),
            }
        }
        Some("FAILED") => {
            if let Err(err) = publish_failure(publisher, None).await {
                tracing::error!(?err, "failed to publish quotas failure");
            }
        }
        _ => {}
    }
}

pub async fn spawn_queue_config_watcher(
    client: &Client,
    publisher: &Arc<FeedbackPublisher>,
    registry: &WatcherRegistry,
    cancel: &CancellationToken,
    tasks: &mut Vec<tokio::task::JoinHandle<()>>,
) -> Result<()> {
    let Some(resource) =
        kube_util::resolve_api_resource(client, KAIWO_API_GROUP, KAIWO_QUEUE_CONFIG_PLURAL).await?
    else {
        tracing::warn!("KaiwoQueueConfig CRD not installed, skipping watcher");
        return Ok(());
    };
    let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
    let registry = registry.clone();
    let cancel = cancel.clone();
    let publisher = publisher.clone();
    tasks.push(tokio::spawn(async move {
        run_watcher(
            "kaiwo_queue_config_watcher",
            api,
            watcher::Config::default(),
            registry,
            cancel,
            |event, obj| {
                let publisher = publisher.clone();
                async move {
                    process_queue_config_event(&publisher, event, obj).await;
                }
            },
        )
        .await;
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_common::messages::default_priority_classes;

    fn allocation(name: &str, gpus: i32) -> QuotaAllocation {
        QuotaAllocation {
            quota_name: name.into(),
            cpu_milli_cores: 4000,
            memory_bytes: 8 << 30,
            ephemeral_storage_bytes: 100 << 30,
            gpu_count: gpus,
            namespaces: if name == "kaiwo" { vec![] } else { vec![name.into()] },
        }
    }

    #[test]
    fn amd_clusters_cover_the_amd_gpu_resource() {
        let spec = build_queue_config_spec(
            &[allocation("team-a", 3)],
            Some(GpuVendor::Amd),
            &default_priority_classes(),
        );
        let group = &spec.cluster_queues[0].spec.resource_groups[0];
        assert!(group.covered_resources.contains(&AMD_GPU_RESOURCE.to_string()));
        let gpu = group.flavors[0]
            .resources
            .iter()
            .find(|r| r.name == AMD_GPU_RESOURCE)
            .unwrap();
        assert_eq!(gpu.nominal_quota, "3");
    }

    #[test]
    fn gpu_free_clusters_skip_the_gpu_resource() {
        let spec = build_queue_config_spec(&[allocation("team-a", 0)], None, &[]);
        let group = &spec.cluster_queues[0].spec.resource_groups[0];
        assert_eq!(group.covered_resources.len(), 3);
    }

    #[test]
    fn priority_classes_become_workload_priority_classes() {
        let spec = build_queue_config_spec(&[], None, &default_priority_classes());
        let values: Vec<i32> = spec.workload_priority_classes.iter().map(|pc| pc.value).collect();
        assert_eq!(values, vec![-100, 0, 100]);
    }

    #[test]
    fn conversion_roundtrips_through_the_queue_config() {
        let original = vec![allocation("team-a", 3), allocation("kaiwo", 5)];
        let spec = build_queue_config_spec(
            &original,
            Some(GpuVendor::Amd),
            &default_priority_classes(),
        );
        let recovered = queue_config_to_allocations(&spec);
        assert_eq!(recovered, original);
    }
}
