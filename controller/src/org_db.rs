use deadpool_postgres::GenericClient;
use serde::Serialize;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::ApiResult;

#[derive(Debug, Clone, Serialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub keycloak_organization_id: Option<String>,
    pub keycloak_group_id: Option<String>,
}

const ORG_COLUMNS: &str = "id, name, keycloak_organization_id, keycloak_group_id";

fn organization_from_row(row: &Row) -> Organization {
    Organization {
        id: row.get("id"),
        name: row.get("name"),
        keycloak_organization_id: row.get("keycloak_organization_id"),
        keycloak_group_id: row.get("keycloak_group_id"),
    }
}

pub async fn get_organization(
    client: &impl GenericClient,
    organization_id: Uuid,
) -> ApiResult<Option<Organization>> {
    let row = client
        .query_opt(
            &format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = $1"),
            &[&organization_id],
        )
        .await?;
    Ok(row.as_ref().map(organization_from_row))
}

pub async fn get_organizations(client: &impl GenericClient) -> ApiResult<Vec<Organization>> {
    let rows = client
        .query(&format!("SELECT {ORG_COLUMNS} FROM organizations"), &[])
        .await?;
    Ok(rows.iter().map(organization_from_row).collect())
}
