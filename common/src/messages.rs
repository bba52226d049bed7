//! Wire schema for the controller <-> dispatcher queues.
//!
//! Every message is a JSON object with a `message_type` discriminator.
//! Unknown discriminators fail deserialization; consumers must treat that as
//! an error rather than acking the message. Status-bearing messages carry
//! `updated_at` so receivers can drop out-of-order updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const COMMON_VHOST: &str = "vh_airm_common";
pub const COMMON_QUEUE: &str = "airm_common";

/// Virtual host a cluster's outbound (controller -> dispatcher) queue lives in.
pub fn cluster_vhost(cluster_id: Uuid) -> String {
    format!("vh_{cluster_id}")
}

/// Queue name equals the cluster id, which is also the dispatcher's AMQP user.
pub fn cluster_queue(cluster_id: Uuid) -> String {
    format!("{cluster_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuVendor {
    #[serde(rename = "AMD")]
    Amd,
    #[serde(rename = "NVIDIA")]
    Nvidia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaStatus {
    Pending,
    Ready,
    Failed,
    Deleting,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespaceStatus {
    Pending,
    Active,
    Terminating,
    Deleted,
    Failed,
    DeleteFailed,
}

/// Status of one secret/storage assignment on one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Pending,
    Synced,
    SyncedError,
    Failed,
    Deleting,
    Deleted,
    DeleteFailed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigMapStatus {
    Added,
    Deleted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentStatus {
    Pending,
    Starting,
    Running,
    Complete,
    Failed,
    Suspended,
    Ready,
    Invalid,
    Added,
    Terminating,
    Deleted,
    CreateFailed,
    DeleteFailed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkloadStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Deleting,
    Deleted,
    Unknown,
}

/// Kubernetes kinds a workload may materialize into. Cascade deletes only
/// touch kinds in this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadComponentKind {
    Job,
    Deployment,
    ConfigMap,
    Service,
    Pod,
    StatefulSet,
    DaemonSet,
    CronJob,
    Ingress,
    #[serde(rename = "HTTPRoute")]
    HttpRoute,
    KaiwoJob,
    KaiwoService,
    #[serde(rename = "AIMService")]
    AimService,
}

impl WorkloadComponentKind {
    pub const ALL: [WorkloadComponentKind; 13] = [
        WorkloadComponentKind::Job,
        WorkloadComponentKind::Deployment,
        WorkloadComponentKind::ConfigMap,
        WorkloadComponentKind::Service,
        WorkloadComponentKind::Pod,
        WorkloadComponentKind::StatefulSet,
        WorkloadComponentKind::DaemonSet,
        WorkloadComponentKind::CronJob,
        WorkloadComponentKind::Ingress,
        WorkloadComponentKind::HttpRoute,
        WorkloadComponentKind::KaiwoJob,
        WorkloadComponentKind::KaiwoService,
        WorkloadComponentKind::AimService,
    ];

    pub fn as_kind(&self) -> &'static str {
        match self {
            WorkloadComponentKind::Job => "Job",
            WorkloadComponentKind::Deployment => "Deployment",
            WorkloadComponentKind::ConfigMap => "ConfigMap",
            WorkloadComponentKind::Service => "Service",
            WorkloadComponentKind::Pod => "Pod",
            WorkloadComponentKind::StatefulSet => "StatefulSet",
            WorkloadComponentKind::DaemonSet => "DaemonSet",
            WorkloadComponentKind::CronJob => "CronJob",
            WorkloadComponentKind::Ingress => "Ingress",
            WorkloadComponentKind::HttpRoute => "HTTPRoute",
            WorkloadComponentKind::KaiwoJob => "KaiwoJob",
            WorkloadComponentKind::KaiwoService => "KaiwoService",
            WorkloadComponentKind::AimService => "AIMService",
        }
    }
}

/// Kubernetes kind used to materialize a secret on the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretComponentKind {
    ExternalSecret,
    #[serde(rename = "Secret")]
    KubernetesSecret,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuInformation {
    pub count: i32,
    #[serde(rename = "type")]
    pub device_type: String,
    pub vendor: GpuVendor,
    pub vram_bytes_per_device: i64,
    pub product_name: String,
}

/// One node as reported by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub name: String,
    pub cpu_milli_cores: i64,
    pub memory_bytes: i64,
    pub ephemeral_storage_bytes: i64,
    pub gpu_information: Option<GpuInformation>,
    pub status: String,
    pub is_ready: bool,
}

/// One cluster-queue entry in an allocation or status message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaAllocation {
    pub quota_name: String,
    pub cpu_milli_cores: i64,
    pub memory_bytes: i64,
    pub ephemeral_storage_bytes: i64,
    pub gpu_count: i32,
    pub namespaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityClass {
    pub name: String,
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AimClusterModel {
    pub resource_name: String,
    pub image_reference: String,
    pub labels: serde_json::Value,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum Message {
    // dispatcher -> controller
    Heartbeat {
        cluster_name: String,
        organization_name: String,
        last_heartbeat_at: DateTime<Utc>,
    },
    ClusterNodes {
        cluster_nodes: Vec<NodeReport>,
        updated_at: DateTime<Utc>,
    },
    ClusterQuotasStatus {
        quota_allocations: Vec<QuotaAllocation>,
        updated_at: DateTime<Utc>,
    },
    ClusterQuotasFailure {
        reason: Option<String>,
        updated_at: DateTime<Utc>,
    },
    WorkloadStatusUpdate {
        workload_id: Uuid,
        status: WorkloadStatus,
        status_reason: Option<String>,
        updated_at: DateTime<Utc>,
    },
    WorkloadComponentStatusUpdate {
        id: Uuid,
        workload_id: Uuid,
        name: String,
        kind: WorkloadComponentKind,
        api_version: String,
        status: ComponentStatus,
        status_reason: Option<String>,
        updated_at: DateTime<Utc>,
    },
    AutoDiscoveredWorkloadComponent {
        project_id: Uuid,
        workload_id: Uuid,
        component_id: Uuid,
        name: String,
        kind: WorkloadComponentKind,
        api_version: String,
        submitter: Option<String>,
        updated_at: DateTime<Utc>,
    },
    ProjectNamespaceStatus {
        project_id: Uuid,
        status: NamespaceStatus,
        status_reason: Option<String>,
        updated_at: DateTime<Utc>,
    },
    ProjectSecretsUpdate {
        project_secret_id: Uuid,
        status: AssignmentStatus,
        status_reason: Option<String>,
        updated_at: DateTime<Utc>,
    },
    ProjectStorageUpdate {
        project_storage_id: Uuid,
        status: ConfigMapStatus,
        status_reason: Option<String>,
        updated_at: DateTime<Utc>,
    },
    AimClusterModels {
        models: Vec<AimClusterModel>,
        synced_at: DateTime<Utc>,
    },

    // controller -> dispatcher
    ClusterQuotasAllocation {
        gpu_vendor: Option<GpuVendor>,
        quota_allocations: Vec<QuotaAllocation>,
        priority_classes: Vec<PriorityClass>,
    },
    WorkloadCreate {
        workload_id: Uuid,
        manifest: String,
    },
    DeleteWorkload {
        workload_id: Uuid,
    },
    ProjectNamespaceCreate {
        name: String,
        project_id: Uuid,
    },
    ProjectNamespaceDelete {
        name: String,
        project_id: Uuid,
    },
    ProjectSecretsCreate {
        project_secret_id: Uuid,
        project_name: String,
        secret_name: String,
        manifest: String,
        secret_type: SecretComponentKind,
    },
    ProjectSecretsDelete {
        project_secret_id: Uuid,
        project_name: String,
        secret_type: SecretComponentKind,
    },
    ProjectS3StorageCreate {
        project_storage_id: Uuid,
        project_name: String,
        storage_name: String,
        secret_name: String,
        bucket_url: String,
        access_key_name: String,
        secret_key_name: String,
    },
    ProjectStorageDelete {
        project_storage_id: Uuid,
        project_name: String,
    },
}

impl Message {
    /// The wire discriminator, mostly for log lines.
    pub fn message_type(&self) -> &'static str {
        match self {
            Message::Heartbeat { .. } => "heartbeat",
            Message::ClusterNodes { .. } => "cluster_nodes",
            Message::ClusterQuotasStatus { .. } => "cluster_quotas_status",
            Message::ClusterQuotasFailure { .. } => "cluster_quotas_failure",
            Message::WorkloadStatusUpdate { .. } => "workload_status_update",
            Message::WorkloadComponentStatusUpdate { .. } => "workload_component_status_update",
            Message::AutoDiscoveredWorkloadComponent { .. } => "auto_discovered_workload_component",
            Message::ProjectNamespaceStatus { .. } => "project_namespace_status",
            Message::ProjectSecretsUpdate { .. } => "project_secrets_update",
            Message::ProjectStorageUpdate { .. } => "project_storage_update",
            Message::AimClusterModels { .. } => "aim_cluster_models",
            Message::ClusterQuotasAllocation { .. } => "cluster_quotas_allocation",
            Message::WorkloadCreate { .. } => "workload_create",
            Message::DeleteWorkload { .. } => "delete_workload",
            Message::ProjectNamespaceCreate { .. } => "project_namespace_create",
            Message::ProjectNamespaceDelete { .. } => "project_namespace_delete",
            Message::ProjectSecretsCreate { .. } => "project_secrets_create",
            Message::ProjectSecretsDelete { .. } => "project_secrets_delete",
            Message::ProjectS3StorageCreate { .. } => "project_s3_storage_create",
            Message::ProjectStorageDelete { .. } => "project_storage_delete",
        }
    }
}

/// The three fixed workload priority classes shipped with every allocation.
pub fn default_priority_classes() -> Vec<PriorityClass> {
    vec![
        PriorityClass {
            name: "low".into(),
            priority: -100,
        },
        PriorityClass {
            name: "medium".into(),
            priority: 0,
        },
        PriorityClass {
            name: "high".into(),
            priority: 100,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: &Message) -> Message {
        let encoded = serde_json::to_string(message).expect("encode");
        serde_json::from_str(&encoded).expect("decode")
    }

    #[test]
    fn heartbeat_roundtrips() {
        let message = Message::Heartbeat {
            cluster_name: "gpu-west".into(),
            organization_name: "acme".into(),
            last_heartbeat_at: Utc::now(),
        };
        assert_eq!(roundtrip(&message), message);
    }

    #[test]
    fn allocation_roundtrips_with_catch_all() {
        let message = Message::ClusterQuotasAllocation {
            gpu_vendor: Some(GpuVendor::Amd),
            quota_allocations: vec![
                QuotaAllocation {
                    quota_name: "team-a".into(),
                    cpu_milli_cores: 4000,
                    memory_bytes: 1 << 30,
                    ephemeral_storage_bytes: 5 << 30,
                    gpu_count: 3,
                    namespaces: vec!["team-a".into()],
                },
                QuotaAllocation {
                    quota_name: "kaiwo".into(),
                    cpu_milli_cores: 12000,
                    memory_bytes: 7 << 30,
                    ephemeral_storage_bytes: 50 << 30,
                    gpu_count: 5,
                    namespaces: vec![],
                },
            ],
            priority_classes: default_priority_classes(),
        };
        assert_eq!(roundtrip(&message), message);
    }

    #[test]
    fn discriminator_matches_wire_tag() {
        let message = Message::DeleteWorkload {
            workload_id: Uuid::new_v4(),
        };
        let value: serde_json::Value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["message_type"], "delete_workload");
        assert_eq!(message.message_type(), "delete_workload");
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let raw = r#"{"message_type": "mystery_blob", "payload": 1}"#;
        assert!(serde_json::from_str::<Message>(raw).is_err());
    }

    #[test]
    fn component_status_uses_screaming_snake_case() {
        let encoded = serde_json::to_string(&ComponentStatus::CreateFailed).unwrap();
        assert_eq!(encoded, "\"CREATE_FAILED\"");
    }

    #[test]
    fn kind_names_match_kubernetes_kinds() {
        for kind in WorkloadComponentKind::ALL {
            let encoded = serde_json::to_string(&kind).unwrap();
            assert_eq!(encoded, format!("\"{}\"", kind.as_kind()));
        }
    }

    #[test]
    fn priority_classes_are_low_medium_high() {
        let classes = default_priority_classes();
        let priorities: Vec<i32> = classes.iter().map(|c| c.priority).collect();
        assert_eq!(priorities, vec![-100, 0, 100]);
    }
}
