use chrono::{DateTime, Utc};
use gantry_common::messages::{ComponentStatus, WorkloadComponentKind, WorkloadStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadType {
    Inference,
    Batch,
    Custom,
}

#[derive(Debug, Clone, Serialize)]
pub struct Workload {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub workload_type: WorkloadType,
    pub status: WorkloadStatus,
    pub status_reason: Option<String>,
    /// Auth-service group carrying access to this workload's endpoint, when
    /// one exists (inference workloads).
    pub cluster_auth_group_id: Option<String>,
    pub aim_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkloadComponent {
    pub id: Uuid,
    pub workload_id: Uuid,
    pub name: String,
    pub kind: WorkloadComponentKind,
    pub api_version: String,
    pub status: ComponentStatus,
    pub status_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitWorkloadRequest {
    pub name: String,
    pub workload_type: WorkloadType,
    /// Multi-document YAML stream of labeled Kubernetes resources.
    pub manifest: String,
    pub aim_id: Option<Uuid>,
    pub cluster_auth_group_id: Option<String>,
}
