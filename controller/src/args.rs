use clap::{Parser, Subcommand};
use gantry_common::args::{ClusterAuthArgs, KeycloakArgs, PostgresArgs, RabbitArgs};

#[derive(Parser, Debug)]
#[command(name = "gantry-controller")]
#[command(about = "Control plane for the gantry GPU workload manager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller API server and message consumer
    Server(ServerArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ServerArgs {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[clap(flatten)]
    pub postgres: PostgresArgs,

    #[clap(flatten)]
    pub rabbit: RabbitArgs,

    #[clap(flatten)]
    pub kc: KeycloakArgs,

    #[clap(flatten)]
    pub cluster_auth: ClusterAuthArgs,
}
