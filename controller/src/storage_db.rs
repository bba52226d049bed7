use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::{AssignmentStatus, ConfigMapStatus};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::db::{status_from_text, status_to_text};
use crate::error::{ApiError, ApiResult};
use crate::secret_models::ProjectSecret;
use crate::status::RollupStatus;
use crate::storage_models::{ProjectStorage, ProjectStorageConfigmap, Storage};

const STORAGE_COLUMNS: &str =
    "id, organization_id, name, secret_id, bucket_url, access_key_name, secret_key_name, \
     status, status_reason, created_at, updated_at, created_by, updated_by";

fn storage_from_row(row: &Row) -> Storage {
    let status: String = row.get("status");
    Storage {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        name: row.get("name"),
        secret_id: row.get("secret_id"),
        bucket_url: row.get("bucket_url"),
        access_key_name: row.get("access_key_name"),
        secret_key_name: row.get("secret_key_name"),
        status: status_from_text(&status).unwrap_or(RollupStatus::Failed),
        status_reason: row.get("status_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        created_by: row.get("created_by"),
        updated_by: row.get("updated_by"),
    }
}

const PROJECT_STORAGE_COLUMNS: &str =
    "id, storage_id, project_id, status, status_reason, updated_at";

fn project_storage_from_row(row: &Row) -> ProjectStorage {
    let status: String = row.get("status");
    ProjectStorage {
        id: row.get("id"),
        storage_id: row.get("storage_id"),
        project_id: row.get("project_id"),
        status: status_from_text(&status).unwrap_or(AssignmentStatus::Unknown),
        status_reason: row.get("status_reason"),
        updated_at: row.get("updated_at"),
    }
}

const CONFIGMAP_COLUMNS: &str = "id, project_storage_id, status, status_reason, updated_at";

fn configmap_from_row(row: &Row) -> ProjectStorageConfigmap {
    let status: String = row.get("status");
    ProjectStorageConfigmap {
        id: row.get("id"),
        project_storage_id: row.get("project_storage_id"),
        status: status_from_text(&status).unwrap_or(ConfigMapStatus::Failed),
        status_reason: row.get("status_reason"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn insert_storage(
    client: &impl GenericClient,
    organization_id: Uuid,
    name: &str,
    secret_id: Uuid,
    bucket_url: &str,
    access_key_name: &str,
    secret_key_name: &str,
    status: RollupStatus,
    creator: &str,
) -> ApiResult<Storage> {
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO storages
                    (organization_id, name, secret_id, bucket_url, access_key_name,
                     secret_key_name, status, created_by, updated_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                RETURNING {STORAGE_COLUMNS}
                "#
            ),
            &[
                &organization_id,
                &name,
                &secret_id,
                &bucket_url,
                &access_key_name,
                &secret_key_name,
                &status_to_text(&status),
                &creator,
            ],
        )
        .await?;
    Ok(storage_from_row(&row))
}

pub async fn get_storage_in_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
    storage_id: Uuid,
) -> ApiResult<Option<Storage>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {STORAGE_COLUMNS} FROM storages WHERE id = $1 AND organization_id = $2"
            ),
            &[&storage_id, &organization_id],
        )
        .await?;
    Ok(row.as_ref().map(storage_from_row))
}

pub async fn get_storages_in_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
) -> ApiResult<Vec<Storage>> {
    let rows = client
        .query(
            &format!(
                "SELECT {STORAGE_COLUMNS} FROM storages WHERE organization_id = $1 ORDER BY name"
            ),
            &[&organization_id],
        )
        .await?;
    Ok(rows.iter().map(storage_from_row).collect())
}

/// Names of storages that still reference `secret_id` inside the given
/// projects; used to refuse secret unassignment.
pub async fn get_storages_referencing_secret_in_projects(
    client: &impl GenericClient,
    project_ids: &[Uuid],
    secret_id: Uuid,
) -> ApiResult<Vec<String>> {
    let rows = client
        .query(
            r#"
            SELECT DISTINCT s.name FROM storages s
            JOIN project_storages ps ON ps.storage_id = s.id
            WHERE s.secret_id = $1 AND ps.project_id = ANY($2)
            "#,
            &[&secret_id, &project_ids],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

pub async fn update_storage_status(
    client: &impl GenericClient,
    storage_id: Uuid,
    status: RollupStatus,
    status_reason: Option<&str>,
    updater: &str,
) -> ApiResult<()> {
    client
        .execute(
            r#"
            UPDATE storages
            SET status = $2, status_reason = $3, updated_by = $4, updated_at = now()
            WHERE id = $1
            "#,
            &[&storage_id, &status_to_text(&status), &status_reason, &updater],
        )
        .await?;
    Ok(())
}

pub async fn delete_storage(client: &impl GenericClient, storage_id: Uuid) -> ApiResult<()> {
    client
        .execute("DELETE FROM storages WHERE id = $1", &[&storage_id])
        .await?;
    Ok(())
}

pub async fn insert_project_storage(
    client: &impl GenericClient,
    storage_id: Uuid,
    project_id: Uuid,
    creator: &str,
) -> ApiResult<ProjectStorage> {
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO project_storages (storage_id, project_id, status, created_by, updated_by)
                VALUES ($1, $2, $3, $4, $4)
                RETURNING {PROJECT_STORAGE_COLUMNS}
                "#
            ),
            &[
                &storage_id,
                &project_id,
                &status_to_text(&AssignmentStatus::Pending),
                &creator,
            ],
        )
        .await?;
    Ok(project_storage_from_row(&row))
}

pub async fn get_project_storage(
    client: &impl GenericClient,
    storage_id: Uuid,
    project_id: Uuid,
) -> ApiResult<Option<ProjectStorage>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {PROJECT_STORAGE_COLUMNS} FROM project_storages \
                 WHERE storage_id = $1 AND project_id = $2"
            ),
            &[&storage_id, &project_id],
        )
        .await?;
    Ok(row.as_ref().map(project_storage_from_row))
}

pub async fn get_project_storage_by_id(
    client: &impl GenericClient,
    project_storage_id: Uuid,
) -> ApiResult<Option<ProjectStorage>> {
    let row = client
        .query_opt(
            &format!("SELECT {PROJECT_STORAGE_COLUMNS} FROM project_storages WHERE id = $1"),
            &[&project_storage_id],
        )
        .await?;
    Ok(row.as_ref().map(project_storage_from_row))
}

pub async fn get_project_storages_for_storage(
    client: &impl GenericClient,
    storage_id: Uuid,
) -> ApiResult<Vec<ProjectStorage>> {
    let rows = client
        .query(
            &format!(
                "SELECT {PROJECT_STORAGE_COLUMNS} FROM project_storages WHERE storage_id = $1"
            ),
            &[&storage_id],
        )
        .await?;
    Ok(rows.iter().map(project_storage_from_row).collect())
}

/// Project-storages whose storage uses the assignment's secret inside the
/// assignment's project.
pub async fn get_project_storages_by_project_secret(
    client: &impl GenericClient,
    assignment: &ProjectSecret,
) -> ApiResult<Vec<ProjectStorage>> {
    let rows = client
        .query(
            &format!(
                r#"
                SELECT {} FROM project_storages ps
                JOIN storages s ON s.id = ps.storage_id
                WHERE s.secret_id = $1 AND ps.project_id = $2
                "#,
                PROJECT_STORAGE_COLUMNS
                    .split(", ")
                    .map(|c| format!("ps.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            &[&assignment.secret_id, &assignment.project_id],
        )
        .await?;
    Ok(rows.iter().map(project_storage_from_row).collect())
}

pub async fn update_project_storage_status(
    client: &impl GenericClient,
    project_storage_id: Uuid,
    status: AssignmentStatus,
    status_reason: Option<&str>,
    updater: &str,
) -> ApiResult<()> {
    client
        .execute(
            r#"
            UPDATE project_storages
            SET status = $2, status_reason = $3, updated_by = $4, updated_at = now()
            WHERE id = $1
            "#,
            &[
                &project_storage_id,
                &status_to_text(&status),
                &status_reason,
                &updater,
            ],
        )
        .await?;
    Ok(())
}

pub async fn delete_project_storage(
    client: &impl GenericClient,
    project_storage_id: Uuid,
) -> ApiResult<()> {
    client
        .execute(
            "DELETE FROM project_storages WHERE id = $1",
            &[&project_storage_id],
        )
        .await?;
    Ok(())
}

pub async fn insert_project_storage_configmap(
    client: &impl GenericClient,
    project_storage_id: Uuid,
    creator: &str,
) -> ApiResult<ProjectStorageConfigmap> {
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO project_storage_configmaps
                    (project_storage_id, status, created_by, updated_by)
                VALUES ($1, $2, $3, $3)
                RETURNING {CONFIGMAP_COLUMNS}
                "#
            ),
            &[
                &project_storage_id,
                &status_to_text(&ConfigMapStatus::Added),
                &creator,
            ],
        )
        .await?;
    Ok(configmap_from_row(&row))
}

pub async fn get_configmap_by_project_storage(
    client: &impl GenericClient,
    project_storage_id: Uuid,
) -> ApiResult<Option<ProjectStorageConfigmap>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {CONFIGMAP_COLUMNS} FROM project_storage_configmaps \
                 WHERE project_storage_id = $1"
            ),
            &[&project_storage_id],
        )
        .await?;
    Ok(row.as_ref().map(configmap_from_row))
}

pub async fn update_configmap_status(
    client: &impl GenericClient,
    configmap_id: Uuid,
    status: ConfigMapStatus,
    status_reason: Option<&str>,
    updater: &str,
    updated_at: Option<DateTime<Utc>>,
) -> ApiResult<()> {
    let updated_at = updated_at.unwrap_or_else(Utc::now);
    let updated = client
        .execute(
            r#"
            UPDATE project_storage_configmaps
            SET status = $2, status_reason = $3, updated_by = $4, updated_at = $5
            WHERE id = $1
            "#,
            &[
                &configmap_id,
                &status_to_text(&status),
                &status_reason,
                &updater,
                &updated_at,
            ],
        )
        .await?;
    if updated == 0 {
        return Err(ApiError::not_found(format!("Configmap {configmap_id} not found")));
    }
    Ok(())
}
