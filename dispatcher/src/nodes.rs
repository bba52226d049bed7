//! Node inventory and heartbeat reporting.

use anyhow::Result;
use chrono::Utc;
use gantry_common::messages::{GpuInformation, GpuVendor, Message, NodeReport};
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;

use crate::config::AppConfig;
use crate::publisher::FeedbackPublisher;
use crate::quantity::{parse_cpu_value, parse_gpu_vram_value, parse_memory_value};

const GPU_CAPACITY_KEY: &str = "amd.com/gpu";
const GPU_DEVICE_ID_LABELS: [&str; 2] = ["amd.com/gpu.device-id", "beta.amd.com/gpu.device-id"];
const GPU_PRODUCT_NAME_LABELS: [&str; 2] =
    ["amd.com/gpu.product-name", "beta.amd.com/gpu.product-name"];
const GPU_VRAM_LABELS: [&str; 2] = ["amd.com/gpu.vram", "beta.amd.com/gpu.vram"];
const PROBLEMATIC_NODE_CONDITIONS: [&str; 4] = [
    "MemoryPressure",
    "DiskPressure",
    "PIDPressure",
    "NetworkUnavailable",
];

/// Combined status string plus readiness, from the node's conditions.
pub fn node_status(node: &Node) -> (String, bool) {
    let Some(conditions) = node.status.as_ref().and_then(|s| s.conditions.as_ref()) else {
        return ("Unknown".into(), false);
    };

    let mut status_parts = Vec::new();
    let mut is_ready = false;

    for condition in conditions {
        if condition.type_ == "Ready" {
            if condition.status == "True" {
                status_parts.push("Ready".to_string());
                is_ready = true;
            } else {
                status_parts.push("NotReady".to_string());
            }
            break;
        }
    }

    if node.spec.as_ref().and_then(|s| s.unschedulable).unwrap_or(false) {
        status_parts.push("SchedulingDisabled".to_string());
        is_ready = false;
    }

    if status_parts.is_empty() {
        status_parts.push("Unknown".to_string());
    }

    for condition in conditions {
        if PROBLEMATIC_NODE_CONDITIONS.contains(&condition.type_.as_str())
            && condition.status == "True"
        {
            status_parts.push(condition.type_.clone());
        }
    }

    (status_parts.join(", "), is_ready)
}

pub fn gpu_info(node: &Node) -> Option<GpuInformation> {
    let capacity = node.status.as_ref().and_then(|s| s.capacity.as_ref())?;
    let count: i32 = capacity.get(GPU_CAPACITY_KEY)?.0.parse().ok()?;
    if count == 0 {
        return None;
    }

    let node_labels: &BTreeMap<String, String> = node.labels();
    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| node_labels.get(*key))
            .cloned()
    };

    Some(GpuInformation {
        count,
        device_type: pick(&GPU_DEVICE_ID_LABELS).unwrap_or_else(|| "Unknown".into()),
        vendor: GpuVendor::Amd,
        vram_bytes_per_device: pick(&GPU_VRAM_LABELS)
            .map(|v| parse_gpu_vram_value(&v))
            .unwrap_or(0),
        product_name: pick(&GPU_PRODUCT_NAME_LABELS)
            .map(|v| v.replace('_', " "))
            .unwrap_or_else(|| "Unknown".into()),
    })
}

pub fn node_report(node: &Node) -> NodeReport {
    let (status, is_ready) = node_status(node);
    let allocatable = node
        .status
        .as_ref()
        .and_then(|s| s.allocatable.as_ref());
    let parse_allocatable = |key: &str, parse: fn(&str) -> Result<i64>| {
        allocatable
            .and_then(|a| a.get(key))
            .and_then(|quantity| parse(&quantity.0).ok())
            .unwrap_or(0)
    };

    NodeReport {
        name: node.name_any(),
        cpu_milli_cores: parse_allocatable("cpu", parse_cpu_value),
        memory_bytes: parse_allocatable("memory", parse_memory_value),
        ephemeral_storage_bytes: parse_allocatable("ephemeral-storage", parse_memory_value),
        gpu_information: gpu_info(node),
        status,
        is_ready,
    }
}

/// Collect the full node set and report it.
pub async fn publish_cluster_nodes(client: &Client, publisher: &FeedbackPublisher) -> Result<()> {
    let api: Api<Node> = Api::all(client.clone());
    let nodes = api.list(&Default::default()).await?;
    let cluster_nodes: Vec<NodeReport> = nodes.items.iter().map(node_report).collect();
    tracing::info!(count = cluster_nodes.len(), "retrieved cluster nodes");
    publisher
        .publish(&Message::ClusterNodes {
            cluster_nodes,
            updated_at: Utc::now(),
        })
        .await
}

pub async fn publish_heartbeat(config: &AppConfig, publisher: &FeedbackPublisher) -> Result<()> {
    publisher
        .publish(&Message::Heartbeat {
            cluster_name: config.cluster_name.clone(),
            organization_name: config.org_name.clone(),
            last_heartbeat_at: Utc::now(),
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeSpec, NodeStatus};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use kube::api::ObjectMeta;

    fn condition(type_: &str, status: &str) -> NodeCondition {
        NodeCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            ..Default::default()
        }
    }

    fn gpu_node() -> Node {
        let mut capacity = BTreeMap::new();
        capacity.insert("amd.com/gpu".to_string(), Quantity("8".to_string()));
        let mut allocatable = BTreeMap::new();
        allocatable.insert("cpu".to_string(), Quantity("64".to_string()));
        allocatable.insert("memory".to_string(), Quantity("512Gi".to_string()));
        allocatable.insert("ephemeral-storage".to_string(), Quantity("1Ti".to_string()));
        let mut node_labels = BTreeMap::new();
        node_labels.insert("amd.com/gpu.device-id".to_string(), "0x74a1".to_string());
        node_labels.insert(
            "amd.com/gpu.product-name".to_string(),
            "Instinct_MI300X".to_string(),
        );
        node_labels.insert("amd.com/gpu.vram".to_string(), "192G".to_string());
        Node {
            metadata: ObjectMeta {
                name: Some("gpu-node-0".into()),
                labels: Some(node_labels),
                ..Default::default()
            },
            status: Some(NodeStatus {
                conditions: Some(vec![condition("Ready", "True")]),
                capacity: Some(capacity),
                allocatable: Some(allocatable),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn ready_gpu_node_report() {
        let report = node_report(&gpu_node());
        assert!(report.is_ready);
        assert_eq!(report.cpu_milli_cores, 64_000);
        assert_eq!(report.memory_bytes, 512 << 30);
        let gpu = report.gpu_information.unwrap();
        assert_eq!(gpu.count, 8);
        assert_eq!(gpu.product_name, "Instinct MI300X");
        assert_eq!(gpu.vram_bytes_per_device, 192_000_000_000);
    }

    #[test]
    fn unschedulable_nodes_are_not_ready() {
        let mut node = gpu_node();
        node.spec = Some(NodeSpec {
            unschedulable: Some(true),
            ..Default::default()
        });
        let (status, is_ready) = node_status(&node);
        assert!(!is_ready);
        assert!(status.contains("SchedulingDisabled"));
    }

    #[test]
    fn pressure_conditions_are_appended() {
        let mut node = gpu_node();
        node.status.as_mut().unwrap().conditions = Some(vec![
            condition("Ready", "True"),
            condition("MemoryPressure", "True"),
            condition("DiskPressure", "False"),
        ]);
        let (status, is_ready) = node_status(&node);
        assert!(is_ready);
        assert_eq!(status, "Ready, MemoryPressure");
    }
}
