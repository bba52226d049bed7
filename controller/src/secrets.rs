//! Secret fan-out and assignment lifecycle.

use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::{AssignmentStatus, Message};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::outbox::Outbox;
use crate::project_db;
use crate::project_models::Project;
use crate::secret_db;
use crate::secret_models::{
    CreateSecretRequest, PreparedManifest, Secret, SecretScope, prepare_manifest,
};
use crate::status::{ProjectStatus, RollupStatus, resolve_rollup_status};
use crate::storages;
use crate::storage_db;
use crate::validate::validate_subdomain_name;

fn secrets_create_message(secret: &Secret, project: &Project, assignment_id: Uuid, manifest: String) -> Message {
    Message::ProjectSecretsCreate {
        project_secret_id: assignment_id,
        project_name: project.name.clone(),
        secret_name: secret.name.clone(),
        manifest,
        secret_type: secret.kind.component_kind(),
    }
}

fn secrets_delete_message(secret: &Secret, project: &Project, assignment_id: Uuid) -> Message {
    Message::ProjectSecretsDelete {
        project_secret_id: assignment_id,
        project_name: project.name.clone(),
        secret_type: secret.kind.component_kind(),
    }
}

async fn ready_project(
    client: &impl GenericClient,
    organization_id: Uuid,
    project_id: Uuid,
) -> ApiResult<Project> {
    let project = project_db::get_project_in_organization(client, organization_id, project_id)
        .await?
        .ok_or_else(|| ApiError::validation(format!("project id={project_id} not found")))?;
    if project.status != ProjectStatus::Ready {
        return Err(ApiError::conflict(format!(
            "Project {} is not in a READY state",
            project.name
        )));
    }
    Ok(project)
}

pub async fn create_secret_in_organization(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    organization_id: Uuid,
    request: &CreateSecretRequest,
    user: &str,
) -> ApiResult<Secret> {
    validate_subdomain_name("Secret", &request.name)?;
    if request.scope == SecretScope::Project && request.project_ids.len() != 1 {
        return Err(ApiError::validation(
            "Project-scoped secrets take exactly one project",
        ));
    }

    let PreparedManifest { ship, store } =
        prepare_manifest(request.kind, request.use_case, &request.manifest)?;

    let initial_status = if request.project_ids.is_empty() {
        RollupStatus::Unassigned
    } else {
        RollupStatus::Pending
    };
    let secret = secret_db::insert_secret(
        client,
        organization_id,
        &request.name,
        request.scope,
        request.kind,
        request.use_case,
        &store,
        initial_status,
        user,
    )
    .await?;

    for project_id in &request.project_ids {
        let project = ready_project(client, organization_id, *project_id).await?;
        let assignment =
            secret_db::insert_project_secret(client, secret.id, project.id, user).await?;
        outbox.enqueue(
            project.cluster_id,
            secrets_create_message(&secret, &project, assignment.id, ship.clone()),
        );
    }

    Ok(secret)
}

/// Delete the whole secret: refuse while Pending or already Deleting; with
/// no assignments the row goes immediately, otherwise every assignment is
/// marked Deleting and the clusters are told to clean up.
pub async fn submit_delete_secret(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    secret: &Secret,
    user: &str,
) -> ApiResult<()> {
    match secret.status {
        RollupStatus::Pending => {
            return Err(ApiError::conflict(
                "Secret is in Pending state and cannot be deleted",
            ));
        }
        RollupStatus::Deleting => {
            return Err(ApiError::conflict("Secret is already marked for deletion"));
        }
        _ => {}
    }

    secret_db::update_secret_status(client, secret.id, RollupStatus::Deleting, None, user, None)
        .await?;

    let assignments = secret_db::get_project_secrets_for_secret(client, secret.id).await?;
    if assignments.is_empty() {
        secret_db::delete_secret(client, secret.id).await?;
        return Ok(());
    }

    for assignment in assignments {
        secret_db::update_project_secret_status(
            client,
            assignment.id,
            AssignmentStatus::Deleting,
            None,
            user,
            None,
        )
        .await?;
        let Some(project) = project_db::get_project(client, assignment.project_id).await? else {
            continue;
        };
        outbox.enqueue(
            project.cluster_id,
            secrets_delete_message(secret, &project, assignment.id),
        );
    }
    Ok(())
}

/// Remove one project assignment. This is a child-level transition only;
/// the parent status is recomputed when the cluster confirms.
pub async fn submit_delete_project_secret(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    organization_id: Uuid,
    project_secret_id: Uuid,
    user: &str,
) -> ApiResult<()> {
    let assignment = secret_db::get_project_secret_by_id(client, project_secret_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project secret not found"))?;
    if assignment.status == AssignmentStatus::Deleting {
        return Err(ApiError::conflict(
            "Project secret is already marked for deletion",
        ));
    }
    let secret = secret_db::get_secret_in_organization(client, organization_id, assignment.secret_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Secret not found"))?;

    ensure_can_remove_secret_from_projects(client, &[assignment.project_id], secret.id).await?;

    secret_db::update_project_secret_status(
        client,
        assignment.id,
        AssignmentStatus::Deleting,
        None,
        user,
        None,
    )
    .await?;

    let project = project_db::get_project(client, assignment.project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    outbox.enqueue(
        project.cluster_id,
        secrets_delete_message(&secret, &project, assignment.id),
    );
    Ok(())
}

/// Replace the assignment set: additions get create messages, removals are
/// marked Deleting and get delete messages.
pub async fn update_secret_assignments(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    organization_id: Uuid,
    secret: &Secret,
    project_ids: &[Uuid],
    user: &str,
) -> ApiResult<()> {
    let current = secret_db::get_project_secrets_for_secret(client, secret.id).await?;
    let current_ids: std::collections::HashSet<Uuid> =
        current.iter().map(|a| a.project_id).collect();
    let desired_ids: std::collections::HashSet<Uuid> = project_ids.iter().copied().collect();

    let to_add: Vec<Uuid> = desired_ids.difference(&current_ids).copied().collect();
    let to_remove: Vec<Uuid> = current_ids.difference(&desired_ids).copied().collect();

    if to_add.is_empty() && to_remove.is_empty() {
        return Err(ApiError::validation("No changes in project assignments"));
    }

    if !to_remove.is_empty() {
        ensure_can_remove_secret_from_projects(client, &to_remove, secret.id).await?;
    }

    secret_db::update_secret_status(client, secret.id, RollupStatus::Pending, None, user, None)
        .await?;

    for project_id in to_add {
        let project = ready_project(client, organization_id, project_id).await?;
        let assignment =
            secret_db::insert_project_secret(client, secret.id, project.id, user).await?;
        outbox.enqueue(
            project.cluster_id,
            secrets_create_message(secret, &project, assignment.id, secret.manifest.clone()),
        );
    }

    for project_id in to_remove {
        let assignment = secret_db::get_project_secret(client, secret.id, project_id)
            .await?
            .ok_or_else(|| {
                ApiError::validation(format!("Project ID {project_id} is not assigned to the secret"))
            })?;
        secret_db::update_project_secret_status(
            client,
            assignment.id,
            AssignmentStatus::Deleting,
            None,
            "system",
            None,
        )
        .await?;
        let project = project_db::get_project(client, project_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Project not found"))?;
        outbox.enqueue(
            project.cluster_id,
            secrets_delete_message(secret, &project, assignment.id),
        );
    }
    Ok(())
}

/// A secret cannot leave a project while a storage there still uses it.
pub async fn ensure_can_remove_secret_from_projects(
    client: &impl GenericClient,
    project_ids: &[Uuid],
    secret_id: Uuid,
) -> ApiResult<()> {
    let blocking =
        storage_db::get_storages_referencing_secret_in_projects(client, project_ids, secret_id)
            .await?;
    if !blocking.is_empty() {
        return Err(ApiError::validation(format!(
            "Cannot remove this secret because it is still referenced by one or more storages: {}",
            blocking.join(", ")
        )));
    }
    Ok(())
}

/// Inbound assignment status from a dispatcher.
pub async fn handle_project_secret_update(
    client: &impl GenericClient,
    organization_id: Uuid,
    project_secret_id: Uuid,
    status: AssignmentStatus,
    status_reason: Option<&str>,
    message_updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    let Some(assignment) = secret_db::get_project_secret_by_id(client, project_secret_id).await?
    else {
        tracing::error!(%project_secret_id, "project secret not found, dropping update");
        return Ok(());
    };
    let Some(secret) =
        secret_db::get_secret_in_organization(client, organization_id, assignment.secret_id).await?
    else {
        tracing::error!(secret_id = %assignment.secret_id, "secret not found, dropping update");
        return Ok(());
    };

    if status == AssignmentStatus::Deleted && assignment.status == AssignmentStatus::Deleting {
        // Terminal delete confirmations always apply; teardown must not get
        // stuck on clock skew.
        secret_db::delete_project_secret(client, assignment.id).await?;
    } else if message_updated_at < assignment.updated_at {
        tracing::info!(%project_secret_id, "stale project secret update ignored");
        return Ok(());
    } else if assignment.status == AssignmentStatus::Deleting
        && !matches!(status, AssignmentStatus::Deleted | AssignmentStatus::DeleteFailed)
    {
        // Mid-delete noise; only terminal delete states may override.
        tracing::info!(
            %project_secret_id,
            ?status,
            "skipping status update for deleting assignment"
        );
    } else {
        secret_db::update_project_secret_status(
            client,
            assignment.id,
            status,
            status_reason,
            "system",
            Some(message_updated_at),
        )
        .await?;
    }

    let remaining = secret_db::get_project_secrets_for_secret(client, secret.id).await?;

    // A project-scoped secret cannot outlive its only assignment.
    if secret.scope == SecretScope::Project && remaining.is_empty() {
        tracing::info!(secret = %secret.name, "deleting project-scoped secret with no assignments");
        secret_db::delete_secret(client, secret.id).await?;
        return Ok(());
    }

    // Storages bound to this assignment re-derive their composite status.
    let project_storages =
        storage_db::get_project_storages_by_project_secret(client, &assignment).await?;
    for project_storage in project_storages {
        storages::update_project_storage_composite(client, organization_id, &project_storage)
            .await?;
    }

    let child_statuses: Vec<AssignmentStatus> = remaining.iter().map(|a| a.status).collect();
    let (new_status, reason) = resolve_rollup_status(secret.status, &child_statuses);
    if new_status == RollupStatus::Deleted {
        tracing::info!(secret = %secret.name, "secret teardown complete, deleting");
        secret_db::delete_secret(client, secret.id).await?;
    } else if new_status != secret.status {
        secret_db::update_secret_status(
            client,
            secret.id,
            new_status,
            reason.as_deref(),
            "system",
            Some(message_updated_at),
        )
        .await?;
    }
    Ok(())
}
