use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::NamespaceStatus;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::db::{status_from_text, status_to_text};
use crate::error::{ApiError, ApiResult};
use crate::project_models::Namespace;

const NAMESPACE_COLUMNS: &str =
    "id, project_id, cluster_id, name, status, status_reason, updated_at";

fn namespace_from_row(row: &Row) -> Namespace {
    let status_text: String = row.get("status");
    Namespace {
        id: row.get("id"),
        project_id: row.get("project_id"),
        cluster_id: row.get("cluster_id"),
        name: row.get("name"),
        status: status_from_text(&status_text).unwrap_or(NamespaceStatus::Failed),
        status_reason: row.get("status_reason"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn insert_namespace(
    client: &impl GenericClient,
    project_id: Uuid,
    cluster_id: Uuid,
    name: &str,
    creator: &str,
) -> ApiResult<Namespace> {
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO namespaces
                    (project_id, cluster_id, name, status, status_reason, created_by, updated_by)
                VALUES ($1, $2, $3, $4, $5, $6, $6)
                RETURNING {NAMESPACE_COLUMNS}
                "#
            ),
            &[
                &project_id,
                &cluster_id,
                &name,
                &status_to_text(&NamespaceStatus::Pending),
                &Some("creating"),
                &creator,
            ],
        )
        .await?;
    Ok(namespace_from_row(&row))
}

pub async fn get_namespace_by_project_and_cluster(
    client: &impl GenericClient,
    project_id: Uuid,
    cluster_id: Uuid,
) -> ApiResult<Option<Namespace>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {NAMESPACE_COLUMNS} FROM namespaces WHERE project_id = $1 AND cluster_id = $2"
            ),
            &[&project_id, &cluster_id],
        )
        .await?;
    Ok(row.as_ref().map(namespace_from_row))
}

pub async fn update_namespace_status(
    client: &impl GenericClient,
    namespace_id: Uuid,
    status: NamespaceStatus,
    status_reason: Option<&str>,
    updater: &str,
    updated_at: Option<DateTime<Utc>>,
) -> ApiResult<Namespace> {
    let updated_at = updated_at.unwrap_or_else(Utc::now);
    let row = client
        .query_opt(
            &format!(
                r#"
                UPDATE namespaces
                SET status = $2, status_reason = $3, updated_by = $4, updated_at = $5
                WHERE id = $1
                RETURNING {NAMESPACE_COLUMNS}
                "#
            ),
            &[&namespace_id, &status_to_text(&status), &status_reason, &updater, &updated_at],
        )
        .await?;
    row.as_ref()
        .map(namespace_from_row)
        .ok_or_else(|| ApiError::not_found(format!("Namespace {namespace_id} not found")))
}
