//! Project lifecycle orchestration.
//!
//! A project is one name, one cluster, one quota, one namespace and one
//! identity-provider group. Creation happens inside a single transaction
//! plus outbox; teardown is queue-mediated and converges through the status
//! rollup as the dispatcher confirms deletions.

use deadpool_postgres::GenericClient;
use gantry_common::messages::{Message, NamespaceStatus, QuotaStatus};
use uuid::Uuid;

use crate::cluster_models::{Cluster, ClusterStatus};
use crate::error::{ApiError, ApiResult};
use crate::identity::IdentityAdmin;
use crate::namespace_db;
use crate::outbox::Outbox;
use crate::project_db;
use crate::project_models::{CreateProjectRequest, Project};
use crate::quota_db;
use crate::quotas;
use crate::status::{ProjectStatus, resolve_project_status};
use crate::validate::{MAX_PROJECTS_PER_CLUSTER, validate_project_name};

/// Create the project with its quota, namespace and identity group. The
/// caller owns the transaction and the outbox; if anything here fails the
/// transaction rolls back, no message is published, and the group created on
/// the identity provider is removed again best-effort.
pub async fn create_project(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    identity: &IdentityAdmin,
    cluster: &Cluster,
    org_group_id: &str,
    request: &CreateProjectRequest,
    creator: &str,
) -> ApiResult<Project> {
    validate_project_name(&request.name)?;

    if cluster.status() != ClusterStatus::Healthy {
        return Err(ApiError::PreconditionNotMet(
            "Project cannot be created for an unhealthy cluster".into(),
        ));
    }

    if project_db::get_project_by_name_in_organization(
        client,
        cluster.organization_id,
        &request.name,
    )
    .await?
    .is_some()
    {
        return Err(ApiError::conflict(format!(
            "Project with name {} already exists",
            request.name
        )));
    }

    // One slot is permanently taken by the catch-all queue.
    let project_count =
        project_db::get_active_project_count_for_cluster(client, cluster.id).await?;
    if project_count >= MAX_PROJECTS_PER_CLUSTER - 1 {
        return Err(ApiError::validation(format!(
            "Maximum of {} projects per cluster exceeded",
            MAX_PROJECTS_PER_CLUSTER - 1
        )));
    }

    let group_id = identity.create_project_group(org_group_id, &request.name).await?;

    let created = async {
        let project = project_db::insert_project(
            client,
            cluster.organization_id,
            cluster.id,
            &request.name,
            &group_id,
            creator,
        )
        .await?;

        quotas::create_quota_for_project(
            client,
            outbox,
            cluster,
            project.id,
            &request.quota,
            creator,
        )
        .await?;

        let namespace =
            namespace_db::insert_namespace(client, project.id, cluster.id, &project.name, creator)
                .await?;
        outbox.enqueue(
            cluster.id,
            Message::ProjectNamespaceCreate {
                name: namespace.name,
                project_id: project.id,
            },
        );

        Ok::<Project, ApiError>(project)
    }
    .await;

    match created {
        Ok(project) => Ok(project),
        Err(err) => {
            identity.delete_group_quietly(&group_id).await;
            Err(err)
        }
    }
}

/// Re-resolve the project status from its namespace and quota. When the
/// project is mid-teardown and both components report Deleted, the project
/// row is hard-deleted along with its identity group.
pub async fn refresh_project_status(
    client: &impl GenericClient,
    identity: &IdentityAdmin,
    project_id: Uuid,
) -> ApiResult<()> {
    let Some(project) = project_db::get_project(client, project_id).await? else {
        tracing::warn!(%project_id, "project vanished before status refresh");
        return Ok(());
    };

    let namespace =
        namespace_db::get_namespace_by_project_and_cluster(client, project.id, project.cluster_id)
            .await?;
    let Some(namespace) = namespace else {
        project_db::update_project_status(
            client,
            project.id,
            ProjectStatus::Failed,
            "Namespace not found",
            "system",
        )
        .await?;
        return Ok(());
    };

    let Some(quota) = quota_db::get_quota_by_project(client, project.id).await? else {
        project_db::update_project_status(
            client,
            project.id,
            ProjectStatus::Failed,
            "Quota not found",
            "system",
        )
        .await?;
        return Ok(());
    };

    if project.status == ProjectStatus::Deleting
        && quota.status == QuotaStatus::Deleted
        && namespace.status == NamespaceStatus::Deleted
    {
        project_db::delete_project(client, project.id).await?;
        identity.delete_group_quietly(&project.keycloak_group_id).await;
        tracing::info!(project = %project.name, "project fully torn down");
        return Ok(());
    }

    let (status, reason) = resolve_project_status(
        namespace.status,
        namespace.status_reason.as_deref(),
        quota.status,
        quota.status_reason.as_deref(),
        project.status,
    );
    project_db::update_project_status(client, project.id, status, &reason, "system").await?;
    Ok(())
}

/// Begin teardown: quota Deleting (re-emits the allocation without it),
/// namespace Terminating plus a delete message, project Deleting.
pub async fn submit_delete_project(
    client: &impl GenericClient,
    outbox: &mut Outbox,
    cluster: &Cluster,
    project: &Project,
    user: &str,
) -> ApiResult<()> {
    if project.status == ProjectStatus::Deleting {
        return Err(ApiError::conflict("Project is already marked for deletion"));
    }

    let quota = quota_db::get_quota_by_project(client, project.id)
        .await?
        .ok_or_else(|| {
            ApiError::InconsistentState(format!("project {} has no quota", project.id))
        })?;
    quotas::delete_quota_for_project(client, outbox, cluster, &quota, user).await?;

    let namespace =
        namespace_db::get_namespace_by_project_and_cluster(client, project.id, project.cluster_id)
            .await?
            .ok_or_else(|| {
                ApiError::InconsistentState(format!("project {} has no namespace", project.id))
            })?;
    namespace_db::update_namespace_status(
        client,
        namespace.id,
        NamespaceStatus::Terminating,
        Some("Namespace is being deleted"),
        user,
        None,
    )
    .await?;
    outbox.enqueue(
        cluster.id,
        Message::ProjectNamespaceDelete {
            name: namespace.name,
            project_id: project.id,
        },
    );

    project_db::update_project_status(
        client,
        project.id,
        ProjectStatus::Deleting,
        "Project is being deleted",
        user,
    )
    .await?;
    Ok(())
}

/// Inbound namespace status from the dispatcher.
pub async fn handle_namespace_status(
    client: &impl GenericClient,
    identity: &IdentityAdmin,
    cluster: &Cluster,
    project_id: Uuid,
    status: NamespaceStatus,
    status_reason: Option<&str>,
    message_updated_at: chrono::DateTime<chrono::Utc>,
) -> ApiResult<()> {
    let namespace =
        namespace_db::get_namespace_by_project_and_cluster(client, project_id, cluster.id)
            .await?
            .ok_or_else(|| {
                ApiError::not_found(format!(
                    "Namespace for project {project_id} not found in cluster {}",
                    cluster.id
                ))
            })?;

    let terminal_delete = matches!(
        status,
        NamespaceStatus::Deleted | NamespaceStatus::DeleteFailed
    );
    if !terminal_delete && message_updated_at < namespace.updated_at {
        tracing::info!(%project_id, "stale namespace status message ignored");
        return Ok(());
    }

    namespace_db::update_namespace_status(
        client,
        namespace.id,
        status,
        status_reason,
        "system",
        Some(message_updated_at),
    )
    .await?;
    refresh_project_status(client, identity, project_id).await?;
    Ok(())
}
