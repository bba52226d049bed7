//! Storage assignment lifecycle and composite status.
//!
//! A storage binds a bucket to projects through two cluster-side artifacts:
//! a config map (built by the dispatcher) and the project-scoped secret
//! assignment that carries the credentials. The project-storage status is a
//! pure function of those two.

use chrono::{DateTime, Utc};
use deadpool_postgres::GenericClient;
use gantry_common::messages::{AssignmentStatus, ConfigMapStatus, Message};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::outbox::Outbox;
use crate::project_db;
use crate::project_models::Project;
use crate::secret_db;
use crate::secret_models::Secret;
use crate::status::{ProjectStatus, RollupStatus, resolve_project_storage_status, resolve_rollup_status};
use crate::storage_db;
use crate::storage_models::{CreateStorageRequest, ProjectStorage, Storage};
use crate::validate::validate_subdomain_name;

fn storage_create_message(
    storage: &Storage,
    project: &Project,
    project_storage_id: Uuid,
    secret_name: &str,
) -> Message {
    Message::ProjectS3StorageCreate {
        project_storage_id,
        project_name: project.name.clone(),
        storage_name: storage.name.clone(),
        secret_name: secret_name.to_string(),
        bucket_url: storage.bucket_url.clone(),
        access_key_name: storage.access_key_name.clone(),
        secret_key_name: storage.secret_key_name.clone(),
    }
}

fn storage_delete_message(project: &Project, project_storage_id: Uuid) -> Message {
    Message::ProjectStorageDelete {
        project_storage_id,
        project_name: project.name.clone(),
    }
}

/// The storage's credentials must exist in the project as a project-scoped
/// secret assignment; create and ship one when missing.
async fn ensure_project_secret_assignment(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    secret: &Secret,
    project: &Project,
    user: &str,
) -> ApiResult<()> {
    if secret_db::get_project_secret(client, secret.id, project.id)
        .await?
        .is_some()
    {
        return Ok(());
    }
    let assignment = secret_db::insert_project_secret(client, secret.id, project.id, user).await?;
    outbox.enqueue(
        project.cluster_id,
        Message::ProjectSecretsCreate {
            project_secret_id: assignment.id,
            project_name: project.name.clone(),
            secret_name: secret.name.clone(),
            manifest: secret.manifest.clone(),
            secret_type: secret.kind.component_kind(),
        },
    );
    Ok(())
}

async fn assign_storage_to_project(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    storage: &Storage,
    secret: &Secret,
    organization_id: Uuid,
    project_id: Uuid,
    user: &str,
) -> ApiResult<()> {
    let project = project_db::get_project_in_organization(client, organization_id, project_id)
        .await?
        .ok_or_else(|| ApiError::validation(format!("project id={project_id} not found")))?;
    if project.status != ProjectStatus::Ready {
        return Err(ApiError::validation(format!(
            "project id={project_id} not READY"
        )));
    }

    ensure_project_secret_assignment(client, outbox, secret, &project, user).await?;

    let project_storage =
        storage_db::insert_project_storage(client, storage.id, project.id, user).await?;
    storage_db::insert_project_storage_configmap(client, project_storage.id, user).await?;
    outbox.enqueue(
        project.cluster_id,
        storage_create_message(storage, &project, project_storage.id, &secret.name),
    );
    Ok(())
}

pub async fn create_storage_in_organization(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    organization_id: Uuid,
    request: &CreateStorageRequest,
    user: &str,
) -> ApiResult<Storage> {
    validate_subdomain_name("Storage", &request.name)?;
    let secret = secret_db::get_secret_in_organization(client, organization_id, request.secret_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Referenced secret not found"))?;

    let initial_status = if request.project_ids.is_empty() {
        RollupStatus::Unassigned
    } else {
        RollupStatus::Pending
    };
    let storage = storage_db::insert_storage(
        client,
        organization_id,
        &request.name,
        request.secret_id,
        &request.bucket_url,
        &request.access_key_name,
        &request.secret_key_name,
        initial_status,
        user,
    )
    .await?;

    for project_id in &request.project_ids {
        assign_storage_to_project(
            client,
            outbox,
            &storage,
            &secret,
            organization_id,
            *project_id,
            user,
        )
        .await?;
    }
    Ok(storage)
}

pub async fn update_storage_assignments(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    organization_id: Uuid,
    storage: &Storage,
    project_ids: &[Uuid],
    user: &str,
) -> ApiResult<()> {
    let current = storage_db::get_project_storages_for_storage(client, storage.id).await?;
    let current_ids: std::collections::HashSet<Uuid> =
        current.iter().map(|ps| ps.project_id).collect();
    let desired_ids: std::collections::HashSet<Uuid> = project_ids.iter().copied().collect();

    let to_add: Vec<Uuid> = desired_ids.difference(&current_ids).copied().collect();
    let to_remove: Vec<Uuid> = current_ids.difference(&desired_ids).copied().collect();
    if to_add.is_empty() && to_remove.is_empty() {
        return Err(ApiError::validation("No changes in project assignments"));
    }

    storage_db::update_storage_status(client, storage.id, RollupStatus::Pending, None, user)
        .await?;

    let secret = secret_db::get_secret_in_organization(client, organization_id, storage.secret_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Referenced secret not found"))?;

    for project_id in to_add {
        assign_storage_to_project(
            client,
            outbox,
            storage,
            &secret,
            organization_id,
            project_id,
            user,
        )
        .await?;
    }

    for project_id in to_remove {
        let project_storage = storage_db::get_project_storage(client, storage.id, project_id)
            .await?
            .ok_or_else(|| {
                ApiError::validation(format!(
                    "Project ID {project_id} is not assigned to the storage"
                ))
            })?;
        storage_db::update_project_storage_status(
            client,
            project_storage.id,
            AssignmentStatus::Deleting,
            None,
            "system",
        )
        .await?;
        let project = project_db::get_project(client, project_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Project not found"))?;
        outbox.enqueue(project.cluster_id, storage_delete_message(&project, project_storage.id));
    }
    Ok(())
}

pub async fn submit_delete_storage(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    storage: &Storage,
    user: &str,
) -> ApiResult<()> {
    match storage.status {
        RollupStatus::Pending => {
            return Err(ApiError::conflict(
                "Storage is in Pending state and cannot be deleted",
            ));
        }
        RollupStatus::Deleting => {
            return Err(ApiError::conflict("Storage is already marked for deletion"));
        }
        _ => {}
    }

    storage_db::update_storage_status(client, storage.id, RollupStatus::Deleting, None, user)
        .await?;

    let assignments = storage_db::get_project_storages_for_storage(client, storage.id).await?;
    if assignments.is_empty() {
        storage_db::delete_storage(client, storage.id).await?;
        return Ok(());
    }

    for project_storage in assignments {
        storage_db::update_project_storage_status(
            client,
            project_storage.id,
            AssignmentStatus::Deleting,
            None,
            user,
        )
        .await?;
        let Some(project) = project_db::get_project(client, project_storage.project_id).await?
        else {
            continue;
        };
        outbox.enqueue(project.cluster_id, storage_delete_message(&project, project_storage.id));
    }
    Ok(())
}

pub async fn submit_delete_project_storage(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    organization_id: Uuid,
    project_storage_id: Uuid,
    user: &str,
) -> ApiResult<()> {
    let project_storage = storage_db::get_project_storage_by_id(client, project_storage_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project storage not found"))?;
    if project_storage.status == AssignmentStatus::Deleting {
        return Err(ApiError::conflict(
            "Project storage is already marked for deletion",
        ));
    }
    let storage =
        storage_db::get_storage_in_organization(client, organization_id, project_storage.storage_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Storage not found"))?;

    storage_db::update_storage_status(client, storage.id, RollupStatus::Pending, None, user)
        .await?;
    storage_db::update_project_storage_status(
        client,
        project_storage.id,
        AssignmentStatus::Deleting,
        None,
        user,
    )
    .await?;

    let project = project_db::get_project(client, project_storage.project_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    outbox.enqueue(project.cluster_id, storage_delete_message(&project, project_storage.id));
    Ok(())
}

/// Inbound config-map status from a dispatcher.
pub async fn handle_project_storage_update(
    client: &impl GenericClient,
    organization_id: Uuid,
    project_storage_id: Uuid,
    status: ConfigMapStatus,
    status_reason: Option<&str>,
    message_updated_at: DateTime<Utc>,
) -> ApiResult<()> {
    let Some(project_storage) =
        storage_db::get_project_storage_by_id(client, project_storage_id).await?
    else {
        tracing::error!(%project_storage_id, "project storage not found, dropping update");
        return Ok(());
    };

    if status == ConfigMapStatus::Deleted {
        // Terminal delete confirmations always apply; teardown must not get
        // stuck on clock skew.
        storage_db::delete_project_storage(client, project_storage.id).await?;
        refresh_storage_rollup(client, organization_id, project_storage.storage_id).await?;
        return Ok(());
    }

    if message_updated_at < project_storage.updated_at {
        tracing::info!(%project_storage_id, "stale project storage update ignored");
        return Ok(());
    }

    let configmap = storage_db::get_configmap_by_project_storage(client, project_storage.id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "Configmap for project storage {project_storage_id} not found"
            ))
        })?;
    storage_db::update_configmap_status(
        client,
        configmap.id,
        status,
        status_reason,
        "system",
        Some(message_updated_at),
    )
    .await?;

    update_project_storage_composite(client, organization_id, &project_storage).await?;
    Ok(())
}

/// Recompute one project-storage from (configmap, project-secret), then the
/// parent storage.
pub async fn update_project_storage_composite(
    client: &impl GenericClient,
    organization_id: Uuid,
    project_storage: &ProjectStorage,
) -> ApiResult<()> {
    let configmap = storage_db::get_configmap_by_project_storage(client, project_storage.id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "Configmap for project storage {} not found",
                project_storage.id
            ))
        })?;
    let storage =
        storage_db::get_storage_in_organization(client, organization_id, project_storage.storage_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Storage not found"))?;
    let project_secret =
        secret_db::get_project_secret(client, storage.secret_id, project_storage.project_id)
            .await?
            .ok_or_else(|| {
                ApiError::not_found(format!(
                    "Project secret for secret {} in project {} not found",
                    storage.secret_id, project_storage.project_id
                ))
            })?;

    let (status, reason) = resolve_project_storage_status(
        configmap.status,
        configmap.status_reason.as_deref(),
        project_secret.status,
        project_secret.status_reason.as_deref(),
    );
    storage_db::update_project_storage_status(
        client,
        project_storage.id,
        status,
        Some(&reason),
        "system",
    )
    .await?;

    refresh_storage_rollup(client, organization_id, storage.id).await?;
    Ok(())
}

async fn refresh_storage_rollup(
    client: &impl GenericClient,
    organization_id: Uuid,
    storage_id: Uuid,
) -> ApiResult<()> {
    let Some(storage) =
        storage_db::get_storage_in_organization(client, organization_id, storage_id).await?
    else {
        tracing::error!(%storage_id, "storage not found during rollup");
        return Ok(());
    };
    let assignments = storage_db::get_project_storages_for_storage(client, storage.id).await?;
    let child_statuses: Vec<AssignmentStatus> = assignments.iter().map(|ps| ps.status).collect();
    let (status, reason) = resolve_rollup_status(storage.status, &child_statuses);
    if status == RollupStatus::Deleted {
        tracing::info!(storage = %storage.name, "storage teardown complete, deleting");
        storage_db::delete_storage(client, storage.id).await?;
    } else if status != storage.status {
        storage_db::update_storage_status(client, storage.id, status, reason.as_deref(), "system")
            .await?;
    }
    Ok(())
}
