use deadpool_postgres::GenericClient;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::db::{status_from_text, status_to_text};
use crate::error::{ApiError, ApiResult};
use crate::project_models::Project;
use crate::status::ProjectStatus;

const PROJECT_COLUMNS: &str =
    "id, organization_id, cluster_id, name, status, status_reason, keycloak_group_id, \
     created_at, updated_at, created_by, updated_by";

fn project_from_row(row: &Row) -> Project {
    let status_text: String = row.get("status");
    Project {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        cluster_id: row.get("cluster_id"),
        name: row.get("name"),
        status: status_from_text(&status_text).unwrap_or(ProjectStatus::Failed),
        status_reason: row.get("status_reason"),
        keycloak_group_id: row.get("keycloak_group_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        created_by: row.get("created_by"),
        updated_by: row.get("updated_by"),
    }
}

pub async fn insert_project(
    client: &impl GenericClient,
    organization_id: Uuid,
    cluster_id: Uuid,
    name: &str,
    keycloak_group_id: &str,
    creator: &str,
) -> ApiResult<Project> {
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO projects
                    (organization_id, cluster_id, name, status, status_reason,
                     keycloak_group_id, created_by, updated_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                RETURNING {PROJECT_COLUMNS}
                "#
            ),
            &[
                &organization_id,
                &cluster_id,
                &name,
                &status_to_text(&ProjectStatus::Pending),
                &Some("Project is being created"),
                &keycloak_group_id,
                &creator,
            ],
        )
        .await?;
    Ok(project_from_row(&row))
}

pub async fn get_project(client: &impl GenericClient, project_id: Uuid) -> ApiResult<Option<Project>> {
    let row = client
        .query_opt(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"),
            &[&project_id],
        )
        .await?;
    Ok(row.as_ref().map(project_from_row))
}

pub async fn get_project_in_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
    project_id: Uuid,
) -> ApiResult<Option<Project>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 AND organization_id = $2"
            ),
            &[&project_id, &organization_id],
        )
        .await?;
    Ok(row.as_ref().map(project_from_row))
}

pub async fn get_project_by_name_in_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
    name: &str,
) -> ApiResult<Option<Project>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE organization_id = $1 AND name = $2"
            ),
            &[&organization_id, &name],
        )
        .await?;
    Ok(row.as_ref().map(project_from_row))
}

pub async fn get_projects_in_cluster(
    client: &impl GenericClient,
    cluster_id: Uuid,
) -> ApiResult<Vec<Project>> {
    let rows = client
        .query(
            &format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE cluster_id = $1 ORDER BY name"
            ),
            &[&cluster_id],
        )
        .await?;
    Ok(rows.iter().map(project_from_row).collect())
}

pub async fn get_projects_in_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
) -> ApiResult<Vec<Project>> {
    let rows = client
        .query(
            &format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE organization_id = $1 ORDER BY name"
            ),
            &[&organization_id],
        )
        .await?;
    Ok(rows.iter().map(project_from_row).collect())
}

/// Projects that still occupy a cluster slot (everything not mid-teardown).
pub async fn get_active_project_count_for_cluster(
    client: &impl GenericClient,
    cluster_id: Uuid,
) -> ApiResult<i64> {
    let row = client
        .query_one(
            "SELECT COUNT(*) FROM projects WHERE cluster_id = $1 AND status != $2",
            &[&cluster_id, &status_to_text(&ProjectStatus::Deleting)],
        )
        .await?;
    Ok(row.get(0))
}

pub async fn update_project_status(
    client: &impl GenericClient,
    project_id: Uuid,
    status: ProjectStatus,
    status_reason: &str,
    updater: &str,
) -> ApiResult<Project> {
    let row = client
        .query_opt(
            &format!(
                r#"
                UPDATE projects
                SET status = $2, status_reason = $3, updated_by = $4, updated_at = now()
                WHERE id = $1
                RETURNING {PROJECT_COLUMNS}
                "#
            ),
            &[&project_id, &status_to_text(&status), &status_reason, &updater],
        )
        .await?;
    row.as_ref()
        .map(project_from_row)
        .ok_or_else(|| ApiError::not_found(format!("Project {project_id} not found")))
}

pub async fn delete_project(client: &impl GenericClient, project_id: Uuid) -> ApiResult<()> {
    client
        .execute("DELETE FROM projects WHERE id = $1", &[&project_id])
        .await?;
    Ok(())
}
