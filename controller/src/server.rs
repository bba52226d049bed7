use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use axum_keycloak_auth::{
    PassthroughMode,
    instance::{KeycloakAuthInstance, KeycloakConfig},
    layer::KeycloakAuthLayer,
};
use deadpool_postgres::Pool;
use gantry_common::args::RabbitArgs;
use gantry_common::rbac::GantryClaims;
use gantry_common::shutdown::shutdown_signal;
use reqwest::Url;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::apikey_handlers;
use crate::args::ServerArgs;
use crate::cluster_auth::ClusterAuthClient;
use crate::cluster_handlers;
use crate::consumer;
use crate::db;
use crate::fabric::Fabric;
use crate::handlers;
use crate::identity::IdentityAdmin;
use crate::metrics;
use crate::project_handlers;
use crate::secret_handlers;
use crate::storage_handlers;
use crate::workload_handlers;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub rabbit: RabbitArgs,
    pub fabric: Arc<Fabric>,
    pub identity: Arc<IdentityAdmin>,
    pub cluster_auth: Arc<ClusterAuthClient>,
}

/// Run the controller: HTTP API, inbound consumer, metrics refresher.
pub async fn run_server(args: ServerArgs) -> Result<()> {
    let kc = args.kc.clone();
    let keycloak_auth_instance = KeycloakAuthInstance::new(
        KeycloakConfig::builder()
            .server(Url::parse(&kc.endpoint).context("invalid KC_ENDPOINT")?)
            .realm(kc.realm.clone())
            .build(),
    );
    let keycloak_layer = KeycloakAuthLayer::<String, GantryClaims>::builder()
        .instance(keycloak_auth_instance)
        .passthrough_mode(PassthroughMode::Block)
        .persist_raw_claims(false)
        .expected_audiences(vec![kc.client_id.clone()])
        .build();

    let pool = gantry_common::postgres::create_pool(args.postgres.clone());
    db::init_schema(&pool)
        .await
        .context("failed to initialize database schema")?;

    let fabric = Arc::new(Fabric::new(args.rabbit.clone()));
    fabric
        .ensure_common_vhost()
        .await
        .context("failed to configure the common vhost")?;

    let identity = Arc::new(
        IdentityAdmin::connect(&args.kc)
            .await
            .context("failed to initialize identity-provider admin client")?,
    );
    let cluster_auth = Arc::new(ClusterAuthClient::new(&args.cluster_auth));

    let state = AppState {
        pool: pool.clone(),
        rabbit: args.rabbit.clone(),
        fabric,
        identity,
        cluster_auth,
    };

    let cancel = CancellationToken::new();
    let consumer_task = consumer::spawn_consumer(state.clone(), cancel.clone());
    let metrics_task = metrics::spawn_metrics_refresher(pool, cancel.clone());
    gantry_common::metrics::maybe_spawn_metrics_server();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/v1/health", get(handlers::health))
        .layer(cors.clone())
        .with_state(state.clone());

    let protected = Router::new()
        .route(
            "/v1/clusters",
            post(cluster_handlers::create_cluster).get(cluster_handlers::list_clusters),
        )
        .route("/v1/clusters/stats", get(cluster_handlers::get_clusters_stats))
        .route(
            "/v1/clusters/{id}",
            get(cluster_handlers::get_cluster)
                .put(cluster_handlers::update_cluster)
                .delete(cluster_handlers::delete_cluster),
        )
        .route("/v1/clusters/{id}/nodes", get(cluster_handlers::get_cluster_nodes))
        .route(
            "/v1/clusters/{id}/projects",
            get(cluster_handlers::get_cluster_projects),
        )
        .route(
            "/v1/projects",
            post(project_handlers::create_project).get(project_handlers::list_projects),
        )
        .route(
            "/v1/projects/{id}",
            get(project_handlers::get_project).delete(project_handlers::delete_project),
        )
        .route("/v1/projects/{id}/quota", put(project_handlers::update_project_quota))
        .route("/v1/projects/{id}/users", post(project_handlers::add_project_users))
        .route(
            "/v1/projects/{id}/users/{user_id}",
            delete(project_handlers::remove_project_user),
        )
        .route(
            "/v1/projects/{id}/workloads",
            post(workload_handlers::submit_workload).get(workload_handlers::list_workloads),
        )
        .route(
            "/v1/projects/{id}/workloads/{workload_id}",
            delete(workload_handlers::delete_workload),
        )
        .route(
            "/v1/projects/{id}/apikeys",
            post(apikey_handlers::create_api_key).get(apikey_handlers::list_api_keys),
        )
        .route(
            "/v1/projects/{id}/apikeys/{key_id}",
            get(apikey_handlers::get_api_key)
                .put(apikey_handlers::update_api_key_bindings)
                .delete(apikey_handlers::delete_api_key),
        )
        .route(
            "/v1/projects/{id}/apikeys/{key_id}/renew",
            post(apikey_handlers::renew_api_key),
        )
        .route(
            "/v1/secrets",
            post(secret_handlers::create_secret).get(secret_handlers::list_secrets),
        )
        .route(
            "/v1/secrets/{id}",
            get(secret_handlers::get_secret)
                .put(secret_handlers::update_secret_assignments)
                .delete(secret_handlers::delete_secret),
        )
        .route(
            "/v1/project-secrets/{id}",
            delete(secret_handlers::delete_project_secret),
        )
        .route(
            "/v1/storages",
            post(storage_handlers::create_storage).get(storage_handlers::list_storages),
        )
        .route(
            "/v1/storages/{id}",
            get(storage_handlers::get_storage)
                .put(storage_handlers::update_storage_assignments)
                .delete(storage_handlers::delete_storage),
        )
        .route(
            "/v1/project-storages/{id}",
            delete(storage_handlers::delete_project_storage),
        )
        .route("/v1/aims", get(handlers::list_aims))
        .layer(keycloak_layer)
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    tracing::info!(%addr, "starting controller HTTP server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    gantry_common::signal_ready();
    axum::serve(listener, protected.merge(public))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    let _ = consumer_task.await;
    let _ = metrics_task.await;
    tracing::info!("server stopped gracefully");
    Ok(())
}
