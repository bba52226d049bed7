use deadpool_postgres::{Config as PgConfig, ManagerConfig, Pool, RecyclingMethod};
use postgres::NoTls;
use std::env;

use crate::args::PostgresArgs;

pub fn create_pool(pg_args: PostgresArgs) -> Pool {
    let mut cfg = PgConfig::new();
    cfg.host = Some(pg_args.postgres_host);
    cfg.port = Some(pg_args.postgres_port);
    cfg.dbname = Some(pg_args.postgres_database);
    cfg.user = Some(pg_args.postgres_username);
    cfg.password = pg_args
        .postgres_password
        .or_else(|| env::var("POSTGRES_PASSWORD").ok());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)
        .expect("Failed to create Postgres pool")
}
