use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::AssignmentStatus;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::db::{status_from_text, status_to_text};
use crate::error::{ApiError, ApiResult};
use crate::secret_models::{Secret, SecretKind, SecretScope, SecretUseCase, ProjectSecret};
use crate::status::RollupStatus;

const SECRET_COLUMNS: &str =
    "id, organization_id, name, scope, kind, use_case, manifest, status, status_reason, \
     created_at, updated_at, created_by, updated_by";

fn secret_from_row(row: &Row) -> Secret {
    let scope: String = row.get("scope");
    let kind: String = row.get("kind");
    let use_case: String = row.get("use_case");
    let status: String = row.get("status");
    Secret {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        name: row.get("name"),
        scope: status_from_text(&scope).unwrap_or(SecretScope::Organization),
        kind: status_from_text(&kind).unwrap_or(SecretKind::KubernetesSecret),
        use_case: status_from_text(&use_case).unwrap_or(SecretUseCase::Generic),
        manifest: row.get("manifest"),
        status: status_from_text(&status).unwrap_or(RollupStatus::Failed),
        status_reason: row.get("status_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        created_by: row.get("created_by"),
        updated_by: row.get("updated_by"),
    }
}

const PROJECT_SECRET_COLUMNS: &str =
    "id, secret_id, project_id, status, status_reason, updated_at";

fn project_secret_from_row(row: &Row) -> ProjectSecret {
    let status: String = row.get("status");
    ProjectSecret {
        id: row.get("id"),
        secret_id: row.get("secret_id"),
        project_id: row.get("project_id"),
        status: status_from_text(&status).unwrap_or(AssignmentStatus::Unknown),
        status_reason: row.get("status_reason"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn insert_secret(
    client: &impl GenericClient,
    organization_id: Uuid,
    name: &str,
    scope: SecretScope,
    kind: SecretKind,
    use_case: SecretUseCase,
    manifest: &str,
    status: RollupStatus,
    creator: &str,
) -> ApiResult<Secret> {
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO secrets
                    (organization_id, name, scope, kind, use_case, manifest, status,
                     created_by, updated_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                RETURNING {SECRET_COLUMNS}
                "#
            ),
            &[
                &organization_id,
                &name,
                &status_to_text(&scope),
                &status_to_text(&kind),
                &status_to_text(&use_case),
                &manifest,
                &status_to_text(&status),
                &creator,
            ],
        )
        .await?;
    Ok(secret_from_row(&row))
}

pub async fn get_secret_in_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
    secret_id: Uuid,
) -> ApiResult<Option<Secret>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {SECRET_COLUMNS} FROM secrets WHERE id = $1 AND organization_id = $2"
            ),
            &[&secret_id, &organization_id],
        )
        .await?;
    Ok(row.as_ref().map(secret_from_row))
}

pub async fn get_secret(client: &impl GenericClient, secret_id: Uuid) -> ApiResult<Option<Secret>> {
    let row = client
        .query_opt(
            &format!("SELECT {SECRET_COLUMNS} FROM secrets WHERE id = $1"),
            &[&secret_id],
        )
        .await?;
    Ok(row.as_ref().map(secret_from_row))
}

pub async fn get_secrets_in_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
    project_id: Option<Uuid>,
) -> ApiResult<Vec<Secret>> {
    let rows = match project_id {
        None => {
            client
                .query(
                    &format!(
                        "SELECT {SECRET_COLUMNS} FROM secrets WHERE organization_id = $1 ORDER BY name"
                    ),
                    &[&organization_id],
                )
                .await?
        }
        Some(project_id) => {
            client
                .query(
                    &format!(
                        r#"
                        SELECT DISTINCT {} FROM secrets s
                        JOIN project_secrets ps ON ps.secret_id = s.id
                        WHERE s.organization_id = $1 AND ps.project_id = $2
                        ORDER BY s.name
                        "#,
                        SECRET_COLUMNS
                            .split(", ")
                            .map(|c| format!("s.{c}"))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    &[&organization_id, &project_id],
                )
                .await?
        }
    };
    Ok(rows.iter().map(secret_from_row).collect())
}

pub async fn update_secret_status(
    client: &impl GenericClient,
    secret_id: Uuid,
    status: RollupStatus,
    status_reason: Option<&str>,
    updater: &str,
    updated_at: Option<DateTime<Utc>>,
) -> ApiResult<()> {
    let updated_at = updated_at.unwrap_or_else(Utc::now);
    client
        .execute(
            r#"
            UPDATE secrets
            SET status = $2, status_reason = $3, updated_by = $4, updated_at = $5
            WHERE id = $1
            "#,
            &[&secret_id, &status_to_text(&status), &status_reason, &updater, &updated_at],
        )
        .await?;
    Ok(())
}

pub async fn delete_secret(client: &impl GenericClient, secret_id: Uuid) -> ApiResult<()> {
    client
        .execute("DELETE FROM secrets WHERE id = $1", &[&secret_id])
        .await?;
    Ok(())
}

pub async fn insert_project_secret(
    client: &impl GenericClient,
    secret_id: Uuid,
    project_id: Uuid,
    creator: &str,
) -> ApiResult<ProjectSecret> {
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO project_secrets (secret_id, project_id, status, created_by, updated_by)
                VALUES ($1, $2, $3, $4, $4)
                RETURNING {PROJECT_SECRET_COLUMNS}
                "#
            ),
            &[
                &secret_id,
                &project_id,
                &status_to_text(&AssignmentStatus::Pending),
                &creator,
            ],
        )
        .await?;
    Ok(project_secret_from_row(&row))
}

pub async fn get_project_secret(
    client: &impl GenericClient,
    secret_id: Uuid,
    project_id: Uuid,
) -> ApiResult<Option<ProjectSecret>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {PROJECT_SECRET_COLUMNS} FROM project_secrets \
                 WHERE secret_id = $1 AND project_id = $2"
            ),
            &[&secret_id, &project_id],
        )
        .await?;
    Ok(row.as_ref().map(project_secret_from_row))
}

pub async fn get_project_secret_by_id(
    client: &impl GenericClient,
    project_secret_id: Uuid,
) -> ApiResult<Option<ProjectSecret>> {
    let row = client
        .query_opt(
            &format!("SELECT {PROJECT_SECRET_COLUMNS} FROM project_secrets WHERE id = $1"),
            &[&project_secret_id],
        )
        .await?;
    Ok(row.as_ref().map(project_secret_from_row))
}

pub async fn get_project_secrets_for_secret(
    client: &impl GenericClient,
    secret_id: Uuid,
) -> ApiResult<Vec<ProjectSecret>> {
    let rows = client
        .query(
            &format!(
                "SELECT {PROJECT_SECRET_COLUMNS} FROM project_secrets WHERE secret_id = $1"
            ),
            &[&secret_id],
        )
        .await?;
    Ok(rows.iter().map(project_secret_from_row).collect())
}

pub async fn update_project_secret_status(
    client: &impl GenericClient,
    project_secret_id: Uuid,
    status: AssignmentStatus,
    status_reason: Option<&str>,
    updater: &str,
    updated_at: Option<DateTime<Utc>>,
) -> ApiResult<ProjectSecret> {
    let updated_at = updated_at.unwrap_or_else(Utc::now);
    let row = client
        .query_opt(
            &format!(
                r#"
                UPDATE project_secrets
                SET status = $2, status_reason = $3, updated_by = $4, updated_at = $5
                WHERE id = $1
                RETURNING {PROJECT_SECRET_COLUMNS}
                "#
            ),
            &[
                &project_secret_id,
                &status_to_text(&status),
                &status_reason,
                &updater,
                &updated_at,
            ],
        )
        .await?;
    row.as_ref()
        .map(project_secret_from_row)
        .ok_or_else(|| ApiError::not_found(format!("Project secret {project_secret_id} not found")))
}

pub async fn delete_project_secret(
    client: &impl GenericClient,
    project_secret_id: Uuid,
) -> ApiResult<()> {
    client
        .execute("DELETE FROM project_secrets WHERE id = $1", &[&project_secret_id])
        .await?;
    Ok(())
}
