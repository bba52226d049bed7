use axum::{
    Extension, RequestPartsExt,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_keycloak_auth::decode::KeycloakToken;
use reqwest::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

pub mod roles {
    pub const SUPER_ADMINISTRATOR: &str = "super_administrator";
    pub const PLATFORM_ADMINISTRATOR: &str = "platform_administrator";
    pub const TEAM_MEMBER: &str = "team_member";
}

/// Claims gantry reads from the access token beyond the standard profile.
#[derive(Clone, Debug, Deserialize)]
pub struct GantryClaims {
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub email: Option<String>,
    /// Group paths, e.g. `/acme/team-a`. The last segment is the project name.
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub realm_access: RealmAccess,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Validated caller identity, extracted from the Keycloak token extension.
#[derive(Clone, Debug)]
pub struct TokenClaims {
    pub subject: String,
    pub organization_id: Option<Uuid>,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
}

impl TokenClaims {
    /// Audit principal: the email when present, else the token subject.
    pub fn principal(&self) -> String {
        self.email.clone().unwrap_or_else(|| self.subject.clone())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_platform_administrator(&self) -> bool {
        self.has_role(roles::PLATFORM_ADMINISTRATOR) || self.has_role(roles::SUPER_ADMINISTRATOR)
    }

    /// Project routes require membership in the group named after the project.
    pub fn is_member_of(&self, project_name: &str) -> bool {
        self.groups.iter().any(|g| g == project_name)
    }
}

pub fn group_name_from_path(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

impl<S> FromRequestParts<S> for TokenClaims
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Extension(token) = parts
            .extract::<Extension<KeycloakToken<String, GantryClaims>>>()
            .await
            .map_err(|e| {
                tracing::error!(?e, "failed to extract Keycloak token");
                StatusCode::UNAUTHORIZED.into_response()
            })?;
        Ok(TokenClaims {
            subject: token.subject.clone(),
            organization_id: token.extra.organization_id,
            email: token.extra.email.clone(),
            roles: token.extra.realm_access.roles.clone(),
            groups: token
                .extra
                .groups
                .iter()
                .map(|g| group_name_from_path(g))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(roles: &[&str], groups: &[&str]) -> TokenClaims {
        TokenClaims {
            subject: "3e9b".into(),
            organization_id: None,
            email: Some("dev@acme.io".into()),
            roles: roles.iter().map(|s| s.to_string()).collect(),
            groups: groups.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn group_paths_reduce_to_project_names() {
        assert_eq!(group_name_from_path("/acme/team-a"), "team-a");
        assert_eq!(group_name_from_path("team-a"), "team-a");
    }

    #[test]
    fn super_administrator_implies_platform_administrator() {
        assert!(claims(&[roles::SUPER_ADMINISTRATOR], &[]).is_platform_administrator());
        assert!(!claims(&[roles::TEAM_MEMBER], &[]).is_platform_administrator());
    }

    #[test]
    fn project_membership_is_exact() {
        let c = claims(&[roles::TEAM_MEMBER], &["team-a"]);
        assert!(c.is_member_of("team-a"));
        assert!(!c.is_member_of("team-b"));
    }
}
