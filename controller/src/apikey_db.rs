use deadpool_postgres::GenericClient;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::apikey_models::ApiKey;
use crate::error::ApiResult;

const API_KEY_COLUMNS: &str =
    "id, project_id, name, truncated_key, cluster_auth_key_id, created_at, updated_at, \
     created_by, updated_by";

fn api_key_from_row(row: &Row) -> ApiKey {
    ApiKey {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        truncated_key: row.get("truncated_key"),
        cluster_auth_key_id: row.get("cluster_auth_key_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        created_by: row.get("created_by"),
        updated_by: row.get("updated_by"),
    }
}

pub async fn insert_api_key(
    client: &impl GenericClient,
    project_id: Uuid,
    name: &str,
    truncated_key: &str,
    cluster_auth_key_id: &str,
    creator: &str,
) -> ApiResult<ApiKey> {
    let row = client
        .query_one(
            &format!(
                r#"
                INSERT INTO api_keys
                    (project_id, name, truncated_key, cluster_auth_key_id, created_by, updated_by)
                VALUES ($1, $2, $3, $4, $5, $5)
                RETURNING {API_KEY_COLUMNS}
                "#
            ),
            &[&project_id, &name, &truncated_key, &cluster_auth_key_id, &creator],
        )
        .await?;
    Ok(api_key_from_row(&row))
}

pub async fn get_api_key(
    client: &impl GenericClient,
    api_key_id: Uuid,
    project_id: Uuid,
) -> ApiResult<Option<ApiKey>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = $1 AND project_id = $2"
            ),
            &[&api_key_id, &project_id],
        )
        .await?;
    Ok(row.as_ref().map(api_key_from_row))
}

pub async fn get_api_keys_for_project(
    client: &impl GenericClient,
    project_id: Uuid,
) -> ApiResult<Vec<ApiKey>> {
    let rows = client
        .query(
            &format!(
                "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE project_id = $1 ORDER BY name"
            ),
            &[&project_id],
        )
        .await?;
    Ok(rows.iter().map(api_key_from_row).collect())
}

pub async fn delete_api_key(client: &impl GenericClient, api_key_id: Uuid) -> ApiResult<()> {
    client
        .execute("DELETE FROM api_keys WHERE id = $1", &[&api_key_id])
        .await?;
    Ok(())
}
