use chrono::{DateTime, Utc};
use gantry_common::messages::{AssignmentStatus, ConfigMapStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::RollupStatus;

/// Organization-scoped S3 storage definition; credentials come from the
/// referenced secret.
#[derive(Debug, Clone, Serialize)]
pub struct Storage {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub secret_id: Uuid,
    pub bucket_url: String,
    pub access_key_name: String,
    pub secret_key_name: String,
    pub status: RollupStatus,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStorage {
    pub id: Uuid,
    pub storage_id: Uuid,
    pub project_id: Uuid,
    pub status: AssignmentStatus,
    pub status_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Tracks the cluster-side config map materialized for one project-storage.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStorageConfigmap {
    pub id: Uuid,
    pub project_storage_id: Uuid,
    pub status: ConfigMapStatus,
    pub status_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStorageRequest {
    pub name: String,
    pub secret_id: Uuid,
    pub bucket_url: String,
    pub access_key_name: String,
    pub secret_key_name: String,
    #[serde(default)]
    pub project_ids: Vec<Uuid>,
}
