use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::QuotaStatus;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::db::{status_from_text, status_to_text};
use crate::error::{ApiError, ApiResult};
use crate::quota_models::{Quota, QuotaSpec};

const QUOTA_COLUMNS: &str =
    "id, project_id, cluster_id, cpu_milli_cores, memory_bytes, ephemeral_storage_bytes, \
     gpu_count, status, status_reason, updated_at";

fn quota_from_row(row: &Row) -> Quota {
    let status_text: String = row.get("status");
    Quota {
        id: row.get("id"),
        project_id: row.get("project_id"),
        cluster_id: row.get("cluster_id"),
        cpu_milli_cores: row.get("cpu_milli_cores"),
        memory_bytes: row.get("memory_bytes"),
        ephemeral_storage_bytes: row.get("ephemeral_storage_bytes"),
        gpu_count: row.get("gpu_count"),
        status: status_from_text(&status_text).unwrap_or(QuotaStatus::Failed),
        status_reason: row.get("status_reason"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn insert_quota(
    client: &impl GenericClient,
    project_id: Uuid,
    cluster_id: Uuid,
    spec: &QuotaSpec,
    status: QuotaStatus,
    creator: &str,
) -> ApiResult<Quota> {
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO quotas
                    (project_id, cluster_id, cpu_milli_cores, memory_bytes,
                     ephemeral_storage_bytes, gpu_count, status, created_by, updated_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                RETURNING {QUOTA_COLUMNS}
                "#
            ),
            &[
                &project_id,
                &cluster_id,
                &spec.cpu_milli_cores,
                &spec.memory_bytes,
                &spec.ephemeral_storage_bytes,
                &spec.gpu_count,
                &status_to_text(&status),
                &creator,
            ],
        )
        .await?;
    Ok(quota_from_row(&row))
}

pub async fn get_quota_by_project(
    client: &impl GenericClient,
    project_id: Uuid,
) -> ApiResult<Option<Quota>> {
    let row = client
        .query_opt(
            &format!("SELECT {QUOTA_COLUMNS} FROM quotas WHERE project_id = $1"),
            &[&project_id],
        )
        .await?;
    Ok(row.as_ref().map(quota_from_row))
}

pub async fn get_quotas_for_cluster(
    client: &impl GenericClient,
    cluster_id: Uuid,
) -> ApiResult<Vec<Quota>> {
    let rows = client
        .query(
            &format!("SELECT {QUOTA_COLUMNS} FROM quotas WHERE cluster_id = $1"),
            &[&cluster_id],
        )
        .await?;
    Ok(rows.iter().map(quota_from_row).collect())
}

pub async fn get_quotas_for_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
) -> ApiResult<Vec<Quota>> {
    let rows = client
        .query(
            &format!(
                r#"
                SELECT {} FROM quotas q
                JOIN projects p ON p.id = q.project_id
                WHERE p.organization_id = $1
                "#,
                QUOTA_COLUMNS
                    .split(", ")
                    .map(|c| format!("q.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            &[&organization_id],
        )
        .await?;
    Ok(rows.iter().map(quota_from_row).collect())
}

/// Replace the quota's resources; used by edits and by the drift handler
/// when it zeroes a quota that disappeared from the cluster.
pub async fn update_quota_resources(
    client: &impl GenericClient,
    quota_id: Uuid,
    spec: &QuotaSpec,
    status: QuotaStatus,
    status_reason: Option<&str>,
    updater: &str,
    updated_at: Option<DateTime<Utc>>,
) -> ApiResult<Quota> {
    let updated_at = updated_at.unwrap_or_else(Utc::now);
    let row = client
        .query_one(
            &format!(
                r#"
                UPDATE quotas
                SET cpu_milli_cores = $2, memory_bytes = $3, ephemeral_storage_bytes = $4,
                    gpu_count = $5, status = $6, status_reason = $7,
                    updated_by = $8, updated_at = $9
                WHERE id = $1
                RETURNING {QUOTA_COLUMNS}
                "#
            ),
            &[
                &quota_id,
                &spec.cpu_milli_cores,
                &spec.memory_bytes,
                &spec.ephemeral_storage_bytes,
                &spec.gpu_count,
                &status_to_text(&status),
                &status_reason,
                &updater,
                &updated_at,
            ],
        )
        .await?;
    Ok(quota_from_row(&row))
}

pub async fn update_quota_status(
    client: &impl GenericClient,
    quota_id: Uuid,
    status: QuotaStatus,
    status_reason: Option<&str>,
    updater: &str,
    updated_at: Option<DateTime<Utc>>,
) -> ApiResult<Quota> {
    let updated_at = updated_at.unwrap_or_else(Utc::now);
    let row = client
        .query_opt(
            &format!(
                r#"
                UPDATE quotas
                SET status = $2, status_reason = $3, updated_by = $4, updated_at = $5
                WHERE id = $1
                RETURNING {QUOTA_COLUMNS}
                "#
            ),
            &[&quota_id, &status_to_text(&status), &status_reason, &updater, &updated_at],
        )
        .await?;
    row.as_ref()
        .map(quota_from_row)
        .ok_or_else(|| ApiError::not_found(format!("Quota {quota_id} not found")))
}
