use anyhow::Result;
use clap::Parser;

mod aims;
mod args;
mod config;
mod consumer;
mod kube_util;
mod namespaces;
mod nodes;
mod publisher;
mod quantity;
mod quotas;
mod secrets;
mod server;
mod storages;
mod watch;
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
