//! Keycloak admin wrapper.
//!
//! Project membership is owned by the identity provider: each project is a
//! group nested under its organization's group, and route access is decided
//! from the token's group claims. The controller only creates/deletes groups
//! and manages membership.

use anyhow::{Context, Result};
use gantry_common::args::KeycloakArgs;
use keycloak::{KeycloakAdmin, KeycloakAdminToken, types::GroupRepresentation};

use crate::error::{ApiError, ApiResult};

pub struct IdentityAdmin {
    admin: KeycloakAdmin,
    realm: String,
}

impl IdentityAdmin {
    pub async fn connect(args: &KeycloakArgs) -> Result<Self> {
        let username = args
            .admin_username
            .clone()
            .context("KC_ADMIN_USERNAME is required")?;
        let password = args
            .admin_password
            .clone()
            .context("KC_ADMIN_PASSWORD is required")?;
        let client = keycloak::prelude::reqwest::Client::new();
        let token = KeycloakAdminToken::acquire(&args.endpoint, &username, &password, &client)
            .await
            .context("Failed to acquire Keycloak admin token")?;
        Ok(Self {
            admin: KeycloakAdmin::new(&args.endpoint, token, client),
            realm: args.realm.clone(),
        })
    }

    /// Create a project group under the organization group and return its id.
    pub async fn create_project_group(
        &self,
        parent_group_id: &str,
        name: &str,
    ) -> ApiResult<String> {
        let representation = GroupRepresentation {
            name: Some(name.to_string()),
            ..Default::default()
        };
        let response = self
            .admin
            .realm_groups_with_group_id_children_post(&self.realm, parent_group_id, representation)
            .await
            .map_err(|e| ApiError::ExternalService(format!("Failed to create group {name}: {e}")))?;
        match response.to_id() {
            Some(id) => Ok(id.to_string()),
            None => self.find_child_group_id(parent_group_id, name).await,
        }
    }

    async fn find_child_group_id(&self, parent_group_id: &str, name: &str) -> ApiResult<String> {
        let children = self
            .admin
            .realm_groups_with_group_id_children_get(
                &self.realm,
                parent_group_id,
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .await
            .map_err(|e| ApiError::ExternalService(format!("Failed to list child groups: {e}")))?;
        children
            .into_iter()
            .find(|g| g.name.as_deref() == Some(name))
            .and_then(|g| g.id)
            .map(|id| id.to_string())
            .ok_or_else(|| {
                ApiError::ExternalService(format!("Created group {name} but could not resolve its id"))
            })
    }

    pub async fn delete_group(&self, group_id: &str) -> ApiResult<()> {
        self.admin
            .realm_groups_with_group_id_delete(&self.realm, group_id)
            .await
            .map_err(|e| ApiError::ExternalService(format!("Failed to delete group {group_id}: {e}")))?;
        Ok(())
    }

    /// Best-effort group removal for rollback paths; failures are logged.
    pub async fn delete_group_quietly(&self, group_id: &str) {
        if let Err(err) = self.delete_group(group_id).await {
            tracing::warn!(group_id, %err, "failed to clean up identity group");
        }
    }

    pub async fn assign_user_to_group(&self, user_id: &str, group_id: &str) -> ApiResult<()> {
        self.admin
            .realm_users_with_user_id_groups_with_group_id_put(&self.realm, user_id, group_id)
            .await
            .map_err(|e| {
                ApiError::ExternalService(format!("Failed to assign user to group: {e}"))
            })?;
        Ok(())
    }

    pub async fn unassign_user_from_group(&self, user_id: &str, group_id: &str) -> ApiResult<()> {
        self.admin
            .realm_users_with_user_id_groups_with_group_id_delete(&self.realm, user_id, group_id)
            .await
            .map_err(|e| {
                ApiError::ExternalService(format!("Failed to unassign user from group: {e}"))
            })?;
        Ok(())
    }
}
