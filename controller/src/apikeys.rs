//! API-key coordination against the external auth service.
//!
//! The external service owns the key; the controller owns the binding of
//! keys to projects and to the auth groups of deployed inference workloads.
//! Creation is compensated: if anything fails after the external key exists,
//! the key is revoked so nothing dangles.

use deadpool_postgres::GenericClient;
use futures::future::join_all;
use std::collections::HashSet;
use uuid::Uuid;

use crate::apikey_db;
use crate::apikey_models::{
    ApiKeyDetails, ApiKeyWithFullKey, CreateApiKeyRequest, UpdateApiKeyBindingsRequest,
    truncate_api_key,
};
use crate::cluster_auth::{ClusterAuthClient, CreateApiKeyRequest as ExternalCreateRequest};
use crate::error::{ApiError, ApiResult};
use crate::project_models::Project;
use crate::workload_db;

/// Auth group ids of deployed (Running/Pending) inference workloads for the
/// given AIMs.
async fn group_ids_for_aims(
    client: &impl GenericClient,
    project: &Project,
    aim_ids: &[Uuid],
) -> ApiResult<HashSet<String>> {
    if aim_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let workloads =
        workload_db::get_deployed_inference_workloads(client, project.id, aim_ids).await?;
    Ok(workloads
        .into_iter()
        .filter_map(|w| w.cluster_auth_group_id)
        .collect())
}

/// Bind/unbind in parallel and collapse the failures into one error.
async fn sync_group_bindings(
    cluster_auth: &ClusterAuthClient,
    key_id: &str,
    current: &HashSet<String>,
    target: &HashSet<String>,
) -> ApiResult<()> {
    let to_remove: Vec<&String> = current.difference(target).collect();
    let to_add: Vec<&String> = target.difference(current).collect();

    let unbinds = join_all(
        to_remove
            .iter()
            .map(|group| cluster_auth.unbind_api_key_from_group(key_id, group)),
    );
    let binds = join_all(
        to_add
            .iter()
            .map(|group| cluster_auth.bind_api_key_to_group(key_id, group)),
    );
    let (unbind_results, bind_results) = tokio::join!(unbinds, binds);

    let mut failed_unbinds = 0;
    for (group, result) in to_remove.iter().zip(unbind_results) {
        match result {
            Ok(()) => tracing::info!(key_id, group = %group, "unbound api key from group"),
            Err(err) => {
                tracing::error!(key_id, group = %group, %err, "failed to unbind api key");
                failed_unbinds += 1;
            }
        }
    }
    let mut failed_binds = 0;
    for (group, result) in to_add.iter().zip(bind_results) {
        match result {
            Ok(()) => tracing::info!(key_id, group = %group, "bound api key to group"),
            Err(err) => {
                tracing::error!(key_id, group = %group, %err, "failed to bind api key");
                failed_binds += 1;
            }
        }
    }

    if failed_unbinds > 0 || failed_binds > 0 {
        let mut details = Vec::new();
        if failed_unbinds > 0 {
            details.push(format!("Failed to unbind from {failed_unbinds} group(s)"));
        }
        if failed_binds > 0 {
            details.push(format!("Failed to bind to {failed_binds} group(s)"));
        }
        return Err(ApiError::ExternalService(format!(
            "API key group synchronization failed: {}",
            details.join(", ")
        )));
    }
    Ok(())
}

pub async fn create_api_key(
    client: &impl GenericClient,
    cluster_auth: &ClusterAuthClient,
    project: &Project,
    request: &CreateApiKeyRequest,
    user: &str,
) -> ApiResult<ApiKeyWithFullKey> {
    tracing::info!(name = %request.name, project_id = %project.id, "creating api key");

    let created = cluster_auth
        .create_api_key(&ExternalCreateRequest {
            ttl: request.ttl.clone(),
            num_uses: request.num_uses,
            renewable: request.renewable,
            period: request.period.clone(),
            explicit_max_ttl: request.explicit_max_ttl.clone(),
            meta: request.meta.clone(),
        })
        .await?;
    let truncated = truncate_api_key(&created.api_key)?;

    // Everything past this point must revoke the external key on failure.
    let outcome: ApiResult<ApiKeyWithFullKey> = async {
        let api_key = apikey_db::insert_api_key(
            client,
            project.id,
            &request.name,
            &truncated,
            &created.key_id,
            user,
        )
        .await?;

        let mut info = cluster_auth.lookup_api_key(&created.key_id).await?;

        if !request.aim_ids.is_empty() {
            let target = group_ids_for_aims(client, project, &request.aim_ids).await?;
            sync_group_bindings(cluster_auth, &created.key_id, &HashSet::new(), &target).await?;
            info = cluster_auth.lookup_api_key(&created.key_id).await?;
        }

        Ok(ApiKeyWithFullKey {
            api_key,
            full_key: created.api_key.clone(),
            expires_at: info.expire_time,
            renewable: info.renewable,
            num_uses: info.num_uses,
            ttl: info.ttl,
        })
    }
    .await;

    match outcome {
        Ok(key) => Ok(key),
        Err(err) => {
            tracing::error!(
                name = %request.name,
                key_id = %created.key_id,
                "api key creation failed, revoking external key"
            );
            if let Err(revoke_err) = cluster_auth.revoke_api_key(&created.key_id).await {
                tracing::error!(key_id = %created.key_id, %revoke_err, "failed to revoke orphaned key");
            }
            Err(err)
        }
    }
}

pub async fn update_api_key_bindings(
    client: &impl GenericClient,
    cluster_auth: &ClusterAuthClient,
    project: &Project,
    api_key_id: Uuid,
    request: &UpdateApiKeyBindingsRequest,
) -> ApiResult<ApiKeyDetails> {
    let api_key = apikey_db::get_api_key(client, api_key_id, project.id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("API key {api_key_id} not found")))?;

    let info = match cluster_auth.lookup_api_key(&api_key.cluster_auth_key_id).await {
        Ok(info) => info,
        Err(ApiError::NotFound(_)) => {
            return delete_orphaned_row(client, api_key.id, api_key_id).await;
        }
        Err(err) => return Err(err),
    };

    let current: HashSet<String> = info.groups.iter().cloned().collect();
    let target = group_ids_for_aims(client, project, &request.aim_ids).await?;
    sync_group_bindings(cluster_auth, &api_key.cluster_auth_key_id, &current, &target).await?;

    get_api_key_details(client, cluster_auth, project, api_key_id).await
}

pub async fn get_api_key_details(
    client: &impl GenericClient,
    cluster_auth: &ClusterAuthClient,
    project: &Project,
    api_key_id: Uuid,
) -> ApiResult<ApiKeyDetails> {
    let api_key = apikey_db::get_api_key(client, api_key_id, project.id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("API key {api_key_id} not found")))?;

    let info = match cluster_auth.lookup_api_key(&api_key.cluster_auth_key_id).await {
        Ok(info) => info,
        Err(ApiError::NotFound(_)) => {
            return delete_orphaned_row(client, api_key.id, api_key_id).await;
        }
        Err(err) => return Err(err),
    };

    Ok(ApiKeyDetails {
        api_key,
        expires_at: info.expire_time,
        renewable: info.renewable,
        num_uses: info.num_uses,
        ttl: info.ttl,
        groups: info.groups,
        entity_id: info.entity_id,
        meta: info.meta,
    })
}

/// The external service no longer knows this key: clean up our row and
/// report not-found.
async fn delete_orphaned_row<T>(
    client: &impl GenericClient,
    row_id: Uuid,
    api_key_id: Uuid,
) -> ApiResult<T> {
    tracing::warn!(%api_key_id, "api key missing in auth service, removing orphaned record");
    apikey_db::delete_api_key(client, row_id).await?;
    Err(ApiError::not_found(format!(
        "API key {api_key_id} not found - orphaned database record has been cleaned up"
    )))
}

pub async fn delete_api_key(
    client: &impl GenericClient,
    cluster_auth: &ClusterAuthClient,
    project: &Project,
    api_key_id: Uuid,
) -> ApiResult<()> {
    let api_key = apikey_db::get_api_key(client, api_key_id, project.id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("API key {api_key_id} not found")))?;

    match cluster_auth.revoke_api_key(&api_key.cluster_auth_key_id).await {
        Ok(()) => tracing::info!(key_id = %api_key.cluster_auth_key_id, "revoked api key"),
        Err(ApiError::NotFound(_)) => {
            tracing::warn!(
                key_id = %api_key.cluster_auth_key_id,
                "api key already gone in auth service, deleting row"
            );
        }
        Err(err) => return Err(err),
    }
    apikey_db::delete_api_key(client, api_key.id).await?;
    Ok(())
}

pub async fn renew_api_key(
    client: &impl GenericClient,
    cluster_auth: &ClusterAuthClient,
    project: &Project,
    api_key_id: Uuid,
    increment: Option<&str>,
) -> ApiResult<serde_json::Value> {
    let api_key = apikey_db::get_api_key(client, api_key_id, project.id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("API key {api_key_id} not found")))?;
    match cluster_auth
        .renew_api_key(&api_key.cluster_auth_key_id, increment)
        .await
    {
        Ok(value) => Ok(value),
        Err(ApiError::NotFound(_)) => delete_orphaned_row(client, api_key.id, api_key_id).await,
        Err(err) => Err(err),
    }
}
