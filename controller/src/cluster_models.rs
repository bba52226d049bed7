use chrono::{DateTime, Duration, Utc};
use gantry_common::messages::{GpuVendor, NodeReport, PriorityClass, default_priority_classes};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derived from the heartbeat age; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Healthy,
    Unhealthy,
    Verifying,
}

pub fn heartbeat_freshness() -> Duration {
    Duration::minutes(5)
}

pub fn derive_cluster_status(
    last_heartbeat_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ClusterStatus {
    match last_heartbeat_at {
        None => ClusterStatus::Verifying,
        Some(at) if now - at > heartbeat_freshness() => ClusterStatus::Unhealthy,
        Some(_) => ClusterStatus::Healthy,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub kube_api_url: Option<String>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

impl Cluster {
    pub fn status(&self) -> ClusterStatus {
        derive_cluster_status(self.last_heartbeat_at, Utc::now())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterNode {
    pub id: Uuid,
    pub cluster_id: Uuid,
    pub name: String,
    pub cpu_milli_cores: i64,
    pub memory_bytes: i64,
    pub ephemeral_storage_bytes: i64,
    pub gpu_count: i32,
    pub gpu_vendor: Option<GpuVendor>,
    pub gpu_type: Option<String>,
    pub gpu_vram_bytes_per_device: i64,
    pub gpu_product_name: Option<String>,
    pub is_ready: bool,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

impl ClusterNode {
    /// True when the report differs from the stored row in any capacity,
    /// GPU, readiness or status field.
    pub fn differs_from(&self, report: &NodeReport) -> bool {
        let gpu = report.gpu_information.as_ref();
        self.cpu_milli_cores != report.cpu_milli_cores
            || self.memory_bytes != report.memory_bytes
            || self.ephemeral_storage_bytes != report.ephemeral_storage_bytes
            || self.is_ready != report.is_ready
            || self.status != report.status
            || self.gpu_count != gpu.map(|g| g.count).unwrap_or(0)
            || self.gpu_vendor != gpu.map(|g| g.vendor)
            || self.gpu_type.as_deref() != gpu.map(|g| g.device_type.as_str())
            || self.gpu_vram_bytes_per_device != gpu.map(|g| g.vram_bytes_per_device).unwrap_or(0)
            || self.gpu_product_name.as_deref() != gpu.map(|g| g.product_name.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusterResources {
    pub cpu_milli_cores: i64,
    pub memory_bytes: i64,
    pub ephemeral_storage_bytes: i64,
    pub gpu_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GpuInfo {
    pub vendor: GpuVendor,
    #[serde(rename = "type")]
    pub device_type: String,
    pub memory_bytes_per_device: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterWithResources {
    #[serde(flatten)]
    pub cluster: Cluster,
    pub status: ClusterStatus,
    pub available_resources: ClusterResources,
    pub allocated_resources: ClusterResources,
    pub gpu_info: Option<GpuInfo>,
    pub total_node_count: usize,
    pub available_node_count: usize,
    pub assigned_quota_count: usize,
    pub priority_classes: Vec<PriorityClass>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClustersStats {
    pub total_cluster_count: usize,
    pub total_node_count: usize,
    pub available_node_count: usize,
    pub total_gpu_node_count: usize,
    pub total_gpu_count: i64,
    pub available_gpu_count: i64,
    pub allocated_gpu_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClusterRequest {
    pub base_url: Option<String>,
    pub kube_api_url: Option<String>,
}

/// Returned exactly once, on creation: the dispatcher's AMQP credential.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterWithUserSecret {
    #[serde(flatten)]
    pub cluster: Cluster,
    pub status: ClusterStatus,
    pub user_secret: String,
}

/// Quota rows only contribute to `allocated` until they start deleting.
pub fn quota_counts_as_allocated(status: gantry_common::messages::QuotaStatus) -> bool {
    use gantry_common::messages::QuotaStatus;
    !matches!(status, QuotaStatus::Deleting | QuotaStatus::Deleted)
}

/// Fold node and quota rows into the derived cluster resource view.
pub fn compute_cluster_resources(
    cluster: Cluster,
    nodes: &[ClusterNode],
    quotas: &[crate::quota_models::Quota],
) -> ClusterWithResources {
    let ready_nodes: Vec<&ClusterNode> = nodes.iter().filter(|n| n.is_ready).collect();
    let allocated: Vec<_> = quotas
        .iter()
        .filter(|q| quota_counts_as_allocated(q.status))
        .collect();

    let available_resources = ClusterResources {
        cpu_milli_cores: ready_nodes.iter().map(|n| n.cpu_milli_cores).sum(),
        memory_bytes: ready_nodes.iter().map(|n| n.memory_bytes).sum(),
        ephemeral_storage_bytes: ready_nodes.iter().map(|n| n.ephemeral_storage_bytes).sum(),
        gpu_count: ready_nodes.iter().map(|n| n.gpu_count as i64).sum(),
    };
    let allocated_resources = ClusterResources {
        cpu_milli_cores: allocated.iter().map(|q| q.cpu_milli_cores).sum(),
        memory_bytes: allocated.iter().map(|q| q.memory_bytes).sum(),
        ephemeral_storage_bytes: allocated.iter().map(|q| q.ephemeral_storage_bytes).sum(),
        gpu_count: allocated.iter().map(|q| q.gpu_count as i64).sum(),
    };

    // Clusters are assumed GPU-homogeneous; any GPU-bearing node describes them all.
    let gpu_info = nodes
        .iter()
        .find(|n| n.gpu_count > 0)
        .and_then(|n| {
            Some(GpuInfo {
                vendor: n.gpu_vendor?,
                device_type: n.gpu_type.clone().unwrap_or_default(),
                memory_bytes_per_device: n.gpu_vram_bytes_per_device,
                name: n.gpu_product_name.clone().unwrap_or_default(),
            })
        });

    let status = cluster.status();
    ClusterWithResources {
        cluster,
        status,
        available_resources,
        allocated_resources,
        gpu_info,
        total_node_count: nodes.len(),
        available_node_count: ready_nodes.len(),
        assigned_quota_count: allocated.len(),
        priority_classes: default_priority_classes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_common::messages::QuotaStatus;

    fn cluster() -> Cluster {
        Cluster {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: Some("gpu-west".into()),
            base_url: None,
            kube_api_url: None,
            last_heartbeat_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "t".into(),
            updated_by: "t".into(),
        }
    }

    fn node(name: &str, ready: bool, gpus: i32) -> ClusterNode {
        ClusterNode {
            id: Uuid::new_v4(),
            cluster_id: Uuid::new_v4(),
            name: name.into(),
            cpu_milli_cores: 16_000,
            memory_bytes: 64 << 30,
            ephemeral_storage_bytes: 500 << 30,
            gpu_count: gpus,
            gpu_vendor: (gpus > 0).then_some(GpuVendor::Amd),
            gpu_type: (gpus > 0).then(|| "MI300X".to_string()),
            gpu_vram_bytes_per_device: if gpus > 0 { 192 << 30 } else { 0 },
            gpu_product_name: (gpus > 0).then(|| "Instinct MI300X".to_string()),
            is_ready: ready,
            status: if ready { "Ready".into() } else { "NotReady".into() },
            updated_at: Utc::now(),
        }
    }

    fn quota(status: QuotaStatus, gpus: i32) -> crate::quota_models::Quota {
        crate::quota_models::Quota {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            cluster_id: Uuid::new_v4(),
            cpu_milli_cores: 1000,
            memory_bytes: 1 << 30,
            ephemeral_storage_bytes: 5 << 30,
            gpu_count: gpus,
            status,
            status_reason: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn heartbeat_age_drives_cluster_status() {
        let now = Utc::now();
        assert_eq!(derive_cluster_status(None, now), ClusterStatus::Verifying);
        assert_eq!(
            derive_cluster_status(Some(now - Duration::minutes(1)), now),
            ClusterStatus::Healthy
        );
        assert_eq!(
            derive_cluster_status(Some(now - Duration::minutes(6)), now),
            ClusterStatus::Unhealthy
        );
    }

    #[test]
    fn only_ready_nodes_count_as_available() {
        let nodes = vec![node("a", true, 8), node("b", false, 8)];
        let view = compute_cluster_resources(cluster(), &nodes, &[]);
        assert_eq!(view.available_resources.gpu_count, 8);
        assert_eq!(view.total_node_count, 2);
        assert_eq!(view.available_node_count, 1);
    }

    #[test]
    fn deleting_quotas_do_not_count_as_allocated() {
        let nodes = vec![node("a", true, 8)];
        let quotas = vec![
            quota(QuotaStatus::Ready, 3),
            quota(QuotaStatus::Deleting, 2),
            quota(QuotaStatus::Deleted, 1),
        ];
        let view = compute_cluster_resources(cluster(), &nodes, &quotas);
        assert_eq!(view.allocated_resources.gpu_count, 3);
        assert_eq!(view.assigned_quota_count, 1);
    }

    #[test]
    fn gpu_info_comes_from_any_gpu_bearing_node() {
        let nodes = vec![node("cpu-only", true, 0), node("gpu", true, 4)];
        let view = compute_cluster_resources(cluster(), &nodes, &[]);
        let gpu = view.gpu_info.expect("gpu info");
        assert_eq!(gpu.device_type, "MI300X");
    }

    #[test]
    fn node_diff_detects_capacity_and_gpu_changes() {
        let stored = node("a", true, 8);
        let mut report = NodeReport {
            name: "a".into(),
            cpu_milli_cores: stored.cpu_milli_cores,
            memory_bytes: stored.memory_bytes,
            ephemeral_storage_bytes: stored.ephemeral_storage_bytes,
            gpu_information: Some(gantry_common::messages::GpuInformation {
                count: 8,
                device_type: "MI300X".into(),
                vendor: GpuVendor::Amd,
                vram_bytes_per_device: 192 << 30,
                product_name: "Instinct MI300X".into(),
            }),
            status: "Ready".into(),
            is_ready: true,
        };
        assert!(!stored.differs_from(&report));
        report.cpu_milli_cores += 1;
        assert!(stored.differs_from(&report));
    }
}
