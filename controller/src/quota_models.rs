use chrono::{DateTime, Utc};
use gantry_common::messages::{QuotaAllocation, QuotaStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cluster_models::ClusterWithResources;
use crate::validate::DEFAULT_CATCH_ALL_QUOTA_NAME;

#[derive(Debug, Clone, Serialize)]
pub struct Quota {
    pub id: Uuid,
    pub project_id: Uuid,
    pub cluster_id: Uuid,
    pub cpu_milli_cores: i64,
    pub memory_bytes: i64,
    pub ephemeral_storage_bytes: i64,
    pub gpu_count: i32,
    pub status: QuotaStatus,
    pub status_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Requested quota resources, used for both create and edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuotaSpec {
    pub cpu_milli_cores: i64,
    pub memory_bytes: i64,
    pub ephemeral_storage_bytes: i64,
    pub gpu_count: i32,
}

impl QuotaSpec {
    pub fn zero() -> Self {
        QuotaSpec {
            cpu_milli_cores: 0,
            memory_bytes: 0,
            ephemeral_storage_bytes: 0,
            gpu_count: 0,
        }
    }
}

/// Validate a proposed quota against what the cluster has left. The four
/// resource checks are independent; all failures are reported together.
pub fn validate_quota_against_cluster(
    view: &ClusterWithResources,
    spec: &QuotaSpec,
    prev: Option<&Quota>,
) -> Vec<&'static str> {
    let mut allocated_cpu = view.allocated_resources.cpu_milli_cores;
    let mut allocated_memory = view.allocated_resources.memory_bytes;
    let mut allocated_storage = view.allocated_resources.ephemeral_storage_bytes;
    let mut allocated_gpu = view.allocated_resources.gpu_count;

    if let Some(prev) = prev {
        allocated_cpu -= prev.cpu_milli_cores;
        allocated_memory -= prev.memory_bytes;
        allocated_storage -= prev.ephemeral_storage_bytes;
        allocated_gpu -= prev.gpu_count as i64;
    }

    let mut errors = Vec::new();
    if allocated_cpu + spec.cpu_milli_cores > view.available_resources.cpu_milli_cores {
        errors.push("CPU");
    }
    if allocated_memory + spec.memory_bytes > view.available_resources.memory_bytes {
        errors.push("memory");
    }
    if allocated_storage + spec.ephemeral_storage_bytes
        > view.available_resources.ephemeral_storage_bytes
    {
        errors.push("storage");
    }
    if allocated_gpu + spec.gpu_count as i64 > view.available_resources.gpu_count {
        errors.push("GPU");
    }
    errors
}

/// The cluster-queue entry for one project quota.
pub fn allocation_for(project_name: &str, quota: &Quota) -> QuotaAllocation {
    QuotaAllocation {
        quota_name: project_name.to_string(),
        cpu_milli_cores: quota.cpu_milli_cores,
        memory_bytes: quota.memory_bytes,
        ephemeral_storage_bytes: quota.ephemeral_storage_bytes,
        gpu_count: quota.gpu_count,
        namespaces: vec![project_name.to_string()],
    }
}

/// The synthetic catch-all queue: whatever capacity is left unallocated,
/// clamped at zero per resource. Its namespace set is always empty.
pub fn catch_all_allocation(view: &ClusterWithResources) -> QuotaAllocation {
    QuotaAllocation {
        quota_name: DEFAULT_CATCH_ALL_QUOTA_NAME.to_string(),
        cpu_milli_cores: (view.available_resources.cpu_milli_cores
            - view.allocated_resources.cpu_milli_cores)
            .max(0),
        memory_bytes: (view.available_resources.memory_bytes - view.allocated_resources.memory_bytes)
            .max(0),
        ephemeral_storage_bytes: (view.available_resources.ephemeral_storage_bytes
            - view.allocated_resources.ephemeral_storage_bytes)
            .max(0),
        gpu_count: ((view.available_resources.gpu_count - view.allocated_resources.gpu_count)
            .max(0)) as i32,
        namespaces: vec![],
    }
}

pub fn quota_matches_allocation(quota: &Quota, allocation: &QuotaAllocation) -> bool {
    quota.cpu_milli_cores == allocation.cpu_milli_cores
        && quota.memory_bytes == allocation.memory_bytes
        && quota.ephemeral_storage_bytes == allocation.ephemeral_storage_bytes
        && quota.gpu_count == allocation.gpu_count
}

pub fn resources_changed(quota: &Quota, spec: &QuotaSpec) -> bool {
    quota.cpu_milli_cores != spec.cpu_milli_cores
        || quota.memory_bytes != spec.memory_bytes
        || quota.ephemeral_storage_bytes != spec.ephemeral_storage_bytes
        || quota.gpu_count != spec.gpu_count
}

fn format_resources(cpu_milli_cores: i64, memory_bytes: i64, storage_bytes: i64, gpu_count: i32) -> String {
    const GIB: f64 = (1u64 << 30) as f64;
    format!(
        "- CPU: {:.2}\n- Memory: {:.2} GB\n- Ephemeral Storage: {:.2} GB\n- GPU Count: {}",
        cpu_milli_cores as f64 / 1000.0,
        memory_bytes as f64 / GIB,
        storage_bytes as f64 / GIB,
        gpu_count
    )
}

pub fn mismatch_reason(applied: &QuotaAllocation) -> String {
    format!(
        "Quota on cluster does not match configured value.\nQuota on cluster:\n{}",
        format_resources(
            applied.cpu_milli_cores,
            applied.memory_bytes,
            applied.ephemeral_storage_bytes,
            applied.gpu_count
        )
    )
}

/// Preserves the previous numbers in prose; the row itself gets zeroed.
pub fn removed_reason(quota: &Quota) -> String {
    format!(
        "Quota was removed from the cluster.\nPreviously configured quota:\n{}",
        format_resources(
            quota.cpu_milli_cores,
            quota.memory_bytes,
            quota.ephemeral_storage_bytes,
            quota.gpu_count
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_models::{ClusterResources, compute_cluster_resources};
    use chrono::Utc;

    fn quota(gpus: i32, cpu: i64) -> Quota {
        Quota {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            cluster_id: Uuid::new_v4(),
            cpu_milli_cores: cpu,
            memory_bytes: 1 << 30,
            ephemeral_storage_bytes: 5 << 30,
            gpu_count: gpus,
            status: QuotaStatus::Ready,
            status_reason: None,
            updated_at: Utc::now(),
        }
    }

    fn view(available_gpu: i64, allocated_gpu: i64) -> ClusterWithResources {
        let cluster = crate::cluster_models::Cluster {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: Some("c1".into()),
            base_url: None,
            kube_api_url: None,
            last_heartbeat_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "t".into(),
            updated_by: "t".into(),
        };
        let mut view = compute_cluster_resources(cluster, &[], &[]);
        view.available_resources = ClusterResources {
            cpu_milli_cores: 64_000,
            memory_bytes: 256 << 30,
            ephemeral_storage_bytes: 1000 << 30,
            gpu_count: available_gpu,
        };
        view.allocated_resources = ClusterResources {
            cpu_milli_cores: 8_000,
            memory_bytes: 32 << 30,
            ephemeral_storage_bytes: 100 << 30,
            gpu_count: allocated_gpu,
        };
        view
    }

    #[test]
    fn over_allocation_reports_each_failing_resource() {
        let spec = QuotaSpec {
            cpu_milli_cores: 100_000,
            memory_bytes: 1 << 30,
            ephemeral_storage_bytes: 1 << 30,
            gpu_count: 100,
        };
        let errors = validate_quota_against_cluster(&view(8, 0), &spec, None);
        assert_eq!(errors, vec!["CPU", "GPU"]);
    }

    #[test]
    fn edits_subtract_the_previous_quota_first() {
        // 8 GPUs total, 8 allocated; growing our own 3 -> 8 is fine.
        let prev = quota(3, 1000);
        let spec = QuotaSpec {
            cpu_milli_cores: 1000,
            memory_bytes: 1 << 30,
            ephemeral_storage_bytes: 5 << 30,
            gpu_count: 8,
        };
        let errors = validate_quota_against_cluster(&view(8, 8), &spec, Some(&prev));
        assert!(errors.is_empty());
    }

    #[test]
    fn catch_all_is_the_unallocated_remainder() {
        let catch_all = catch_all_allocation(&view(8, 3));
        assert_eq!(catch_all.quota_name, "kaiwo");
        assert_eq!(catch_all.gpu_count, 5);
        assert!(catch_all.namespaces.is_empty());
        // allocated + catch-all == available
        assert_eq!(catch_all.cpu_milli_cores, 64_000 - 8_000);
    }

    #[test]
    fn catch_all_clamps_at_zero_when_over_allocated() {
        let catch_all = catch_all_allocation(&view(4, 9));
        assert_eq!(catch_all.gpu_count, 0);
    }

    #[test]
    fn identical_resources_mean_no_change() {
        let q = quota(3, 1000);
        let same = QuotaSpec {
            cpu_milli_cores: 1000,
            memory_bytes: 1 << 30,
            ephemeral_storage_bytes: 5 << 30,
            gpu_count: 3,
        };
        assert!(!resources_changed(&q, &same));
        assert!(resources_changed(&q, &QuotaSpec { gpu_count: 4, ..same }));
    }

    #[test]
    fn drift_reasons_render_both_sides() {
        let q = quota(3, 1000);
        let reason = removed_reason(&q);
        assert!(reason.contains("Previously configured"));
        assert!(reason.contains("GPU Count: 3"));
        let applied = allocation_for("p", &quota(2, 500));
        assert!(mismatch_reason(&applied).contains("CPU: 0.50"));
    }
}
