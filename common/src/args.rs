use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct PostgresArgs {
    #[arg(long, env = "POSTGRES_HOST", default_value = "localhost")]
    pub postgres_host: String,

    #[arg(long, env = "POSTGRES_PORT", default_value_t = 5432)]
    pub postgres_port: u16,

    #[arg(long, env = "POSTGRES_DATABASE", default_value = "gantry")]
    pub postgres_database: String,

    #[arg(long, env = "POSTGRES_USERNAME", default_value = "postgres")]
    pub postgres_username: String,

    #[arg(long, env = "POSTGRES_PASSWORD")]
    pub postgres_password: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct RabbitArgs {
    #[arg(long, env = "RABBITMQ_HOST", default_value = "localhost")]
    pub rabbitmq_host: String,

    #[arg(long, env = "RABBITMQ_PORT", default_value_t = 5672)]
    pub rabbitmq_port: u16,

    #[arg(long, env = "RABBITMQ_USER", default_value = "guest")]
    pub rabbitmq_user: String,

    #[arg(long, env = "RABBITMQ_PASSWORD", default_value = "guest")]
    pub rabbitmq_password: String,

    /// Management API root, used for vhost/user provisioning
    #[arg(long, env = "RABBITMQ_MANAGEMENT_URL", default_value = "http://localhost:15672/api")]
    pub rabbitmq_management_url: String,
}

impl RabbitArgs {
    /// AMQP URI for a specific virtual host.
    pub fn amqp_uri(&self, vhost: &str) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.rabbitmq_user, self.rabbitmq_password, self.rabbitmq_host, self.rabbitmq_port, vhost
        )
    }

    pub fn uri_redacted(&self, vhost: &str) -> String {
        format!(
            "amqp://{}:****@{}:{}/{}",
            self.rabbitmq_user, self.rabbitmq_host, self.rabbitmq_port, vhost
        )
    }
}

#[derive(Parser, Debug, Clone)]
pub struct KeycloakArgs {
    #[arg(long, env = "KC_ENDPOINT", required = true)]
    pub endpoint: String,

    #[arg(long, env = "KC_REALM", required = true)]
    pub realm: String,

    #[arg(long, env = "KC_ADMIN_USERNAME")]
    pub admin_username: Option<String>,

    #[arg(long, env = "KC_ADMIN_PASSWORD")]
    pub admin_password: Option<String>,

    #[arg(long, env = "KC_CLIENT_ID", required = true)]
    pub client_id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ClusterAuthArgs {
    /// Base URL of the external auth service that issues API keys
    #[arg(long, env = "CLUSTER_AUTH_URL", default_value = "http://localhost:8200")]
    pub cluster_auth_url: String,

    #[arg(long, env = "CLUSTER_AUTH_ADMIN_TOKEN", default_value = "")]
    pub cluster_auth_admin_token: String,
}
