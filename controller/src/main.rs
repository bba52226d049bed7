use anyhow::Result;
use clap::Parser;

mod aims;
mod apikey_db;
mod apikey_handlers;
mod apikey_models;
mod apikeys;
mod args;
mod cluster_auth;
mod cluster_db;
mod cluster_handlers;
mod cluster_models;
mod clusters;
mod consumer;
mod db;
mod error;
mod fabric;
mod handlers;
mod identity;
mod metrics;
mod namespace_db;
mod org_db;
mod outbox;
mod project_db;
mod project_handlers;
mod project_models;
mod projects;
mod quota_db;
mod quota_models;
mod quotas;
mod secret_db;
mod secret_handlers;
mod secret_models;
mod secrets;
mod server;
mod status;
mod storage_db;
mod storage_handlers;
mod storage_models;
mod storages;
mod validate;
mod workload_db;
mod workload_handlers;
mod workload_models;
mod workloads;

use args::{Cli, Commands};
use server::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    gantry_common::init();

    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => run_server(args).await,
    }
}
