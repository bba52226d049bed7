use clap::{Parser, Subcommand};
use gantry_common::args::RabbitArgs;

#[derive(Parser, Debug)]
#[command(name = "gantry-dispatcher")]
#[command(about = "Per-cluster dispatcher for the gantry GPU workload manager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dispatcher: consumer, watchers and health server
    Server(ServerArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ServerArgs {
    /// Port for the health/trigger HTTP surface
    #[arg(long, env = "PORT", default_value_t = 8081)]
    pub port: u16,

    /// Organization this cluster belongs to; read from the cluster
    /// ConfigMap when unset
    #[arg(long, env = "ORG_NAME")]
    pub org_name: Option<String>,

    /// Name this cluster reports as; read from the cluster ConfigMap when
    /// unset
    #[arg(long, env = "KUBE_CLUSTER_NAME")]
    pub cluster_name: Option<String>,

    /// Use the local kubeconfig context instead of in-cluster config
    #[arg(long, env = "USE_LOCAL_KUBE_CONTEXT", default_value_t = false)]
    pub use_local_kube_context: bool,

    /// Seconds between heartbeat messages
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECONDS", default_value_t = 60)]
    pub heartbeat_interval_seconds: u64,

    #[clap(flatten)]
    pub rabbit: RabbitArgs,
}
