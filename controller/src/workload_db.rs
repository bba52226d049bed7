use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::{ComponentStatus, WorkloadComponentKind, WorkloadStatus};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::db::{status_from_text, status_to_text};
use crate::error::{ApiError, ApiResult};
use crate::workload_models::{Workload, WorkloadComponent, WorkloadType};

const WORKLOAD_COLUMNS: &str =
    "id, project_id, name, workload_type, status, status_reason, cluster_auth_group_id, \
     aim_id, updated_at";

fn workload_from_row(row: &Row) -> Workload {
    let workload_type: String = row.get("workload_type");
    let status: String = row.get("status");
    Workload {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        workload_type: status_from_text(&workload_type).unwrap_or(WorkloadType::Custom),
        status: status_from_text(&status).unwrap_or(WorkloadStatus::Unknown),
        status_reason: row.get("status_reason"),
        cluster_auth_group_id: row.get("cluster_auth_group_id"),
        aim_id: row.get("aim_id"),
        updated_at: row.get("updated_at"),
    }
}

const COMPONENT_COLUMNS: &str =
    "id, workload_id, name, kind, api_version, status, status_reason, updated_at";

fn component_from_row(row: &Row) -> WorkloadComponent {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    WorkloadComponent {
        id: row.get("id"),
        workload_id: row.get("workload_id"),
        name: row.get("name"),
        kind: status_from_text(&kind).unwrap_or(WorkloadComponentKind::Pod),
        api_version: row.get("api_version"),
        status: status_from_text(&status).unwrap_or(ComponentStatus::Unknown),
        status_reason: row.get("status_reason"),
        updated_at: row.get("updated_at"),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_workload(
    client: &impl GenericClient,
    id: Option<Uuid>,
    project_id: Uuid,
    name: &str,
    workload_type: WorkloadType,
    status: WorkloadStatus,
    cluster_auth_group_id: Option<&str>,
    aim_id: Option<Uuid>,
    creator: &str,
) -> ApiResult<Workload> {
    let id = id.unwrap_or_else(Uuid::new_v4);
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO workloads
                    (id, project_id, name, workload_type, status, cluster_auth_group_id,
                     aim_id, created_by, updated_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                RETURNING {WORKLOAD_COLUMNS}
                "#
            ),
            &[
                &id,
                &project_id,
                &name,
                &status_to_text(&workload_type),
                &status_to_text(&status),
                &cluster_auth_group_id,
                &aim_id,
                &creator,
            ],
        )
        .await?;
    Ok(workload_from_row(&row))
}

pub async fn get_workload(client: &impl GenericClient, workload_id: Uuid) -> ApiResult<Option<Workload>> {
    let row = client
        .query_opt(
            &format!("SELECT {WORKLOAD_COLUMNS} FROM workloads WHERE id = $1"),
            &[&workload_id],
        )
        .await?;
    Ok(row.as_ref().map(workload_from_row))
}

pub async fn get_workloads_for_project(
    client: &impl GenericClient,
    project_id: Uuid,
) -> ApiResult<Vec<Workload>> {
    let rows = client
        .query(
            &format!("SELECT {WORKLOAD_COLUMNS} FROM workloads WHERE project_id = $1 ORDER BY name"),
            &[&project_id],
        )
        .await?;
    Ok(rows.iter().map(workload_from_row).collect())
}

/// Deployed inference workloads for the given AIMs; API keys bind to the
/// auth groups of these.
pub async fn get_deployed_inference_workloads(
    client: &impl GenericClient,
    project_id: Uuid,
    aim_ids: &[Uuid],
) -> ApiResult<Vec<Workload>> {
    let rows = client
        .query(
            &format!(
                r#"
                SELECT {WORKLOAD_COLUMNS} FROM workloads
                WHERE project_id = $1 AND workload_type = $2
                  AND status = ANY($3) AND aim_id = ANY($4)
                "#
            ),
            &[
                &project_id,
                &status_to_text(&WorkloadType::Inference),
                &vec![
                    status_to_text(&WorkloadStatus::Running),
                    status_to_text(&WorkloadStatus::Pending),
                ],
                &aim_ids,
            ],
        )
        .await?;
    Ok(rows.iter().map(workload_from_row).collect())
}

pub async fn update_workload_status(
    client: &impl GenericClient,
    workload_id: Uuid,
    status: WorkloadStatus,
    status_reason: Option<&str>,
    updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    client
        .execute(
            r#"
            UPDATE workloads
            SET status = $2, status_reason = $3, updated_by = 'system', updated_at = $4
            WHERE id = $1
            "#,
            &[&workload_id, &status_to_text(&status), &status_reason, &updated_at],
        )
        .await?;
    Ok(())
}

pub async fn insert_component(
    client: &impl GenericClient,
    id: Uuid,
    workload_id: Uuid,
    name: &str,
    kind: WorkloadComponentKind,
    api_version: &str,
    status: ComponentStatus,
    creator: &str,
) -> ApiResult<WorkloadComponent> {
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO workload_components
                    (id, workload_id, name, kind, api_version, status, created_by, updated_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                ON CONFLICT (id) DO UPDATE SET id = workload_components.id
                RETURNING {COMPONENT_COLUMNS}
                "#
            ),
            &[
                &id,
                &workload_id,
                &name,
                &status_to_text(&kind),
                &api_version,
                &status_to_text(&status),
                &creator,
            ],
        )
        .await?;
    Ok(component_from_row(&row))
}

pub async fn get_component(
    client: &impl GenericClient,
    component_id: Uuid,
) -> ApiResult<Option<WorkloadComponent>> {
    let row = client
        .query_opt(
            &format!("SELECT {COMPONENT_COLUMNS} FROM workload_components WHERE id = $1"),
            &[&component_id],
        )
        .await?;
    Ok(row.as_ref().map(component_from_row))
}

pub async fn get_components_for_workload(
    client: &impl GenericClient,
    workload_id: Uuid,
) -> ApiResult<Vec<WorkloadComponent>> {
    let rows = client
        .query(
            &format!(
                "SELECT {COMPONENT_COLUMNS} FROM workload_components WHERE workload_id = $1"
            ),
            &[&workload_id],
        )
        .await?;
    Ok(rows.iter().map(component_from_row).collect())
}

pub async fn update_component_status(
    client: &impl GenericClient,
    component_id: Uuid,
    status: ComponentStatus,
    status_reason: Option<&str>,
    updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    client
        .execute(
            r#"
            UPDATE workload_components
            SET status = $2, status_reason = $3, updated_by = 'system', updated_at = $4
            WHERE id = $1
            "#,
            &[&component_id, &status_to_text(&status), &status_reason, &updated_at],
        )
        .await?;
    Ok(())
}
