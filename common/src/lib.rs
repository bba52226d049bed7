use std::fmt::{Debug, Display};

use anyhow::Error;
use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};

pub mod args;
pub mod messages;
pub mod metrics;
pub mod postgres;
pub mod rabbit;
pub mod rbac;
pub mod shutdown;

pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_else(|_| String::new())
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);
}

pub fn signal_ready() {
    std::fs::write("/etc/ready", "ready").expect("Failed to write readiness file");
}

/// Labels and annotations gantry stamps onto cluster-side resources.
pub mod labels {
    pub const WORKLOAD_ID: &str = "workload-id";
    pub const COMPONENT_ID: &str = "component-id";
    pub const PROJECT_ID: &str = "project-id";
    pub const PROJECT_SECRET_ID: &str = "project-secret-id";
    pub const PROJECT_STORAGE_ID: &str = "project-storage-id";
    pub const QUEUE_MANAGED: &str = "queue-managed";
    pub const USE_CASE: &str = "airm.silogen.com/use-case";

    pub const AUTO_DISCOVERED_ANNOTATION: &str = "airm.silogen.ai/auto-discovered";
    pub const SUBMITTER_ANNOTATION: &str = "airm.silogen.ai/submitter";
}

pub mod response {
    use super::*;

    pub fn print_error<T>(e: T)
    where
        T: Into<Error> + Display + Debug,
    {
        tracing::error!("{:?}", e.into());
    }

    pub fn err_resp<T>(e: T, code: StatusCode) -> Response
    where
        T: Into<Error> + Display + Debug,
    {
        let reason = format!("{}", e);
        print_error(e);
        (code, Json(serde_json::json!({"reason": reason}))).into_response()
    }

    pub fn not_found<T>(e: T) -> Response
    where
        T: Into<Error> + Display + Debug,
    {
        err_resp(e, StatusCode::NOT_FOUND)
    }

    pub fn conflict<T>(e: T) -> Response
    where
        T: Into<Error> + Display + Debug,
    {
        err_resp(e, StatusCode::CONFLICT)
    }

    pub fn bad_request<T>(e: T) -> Response
    where
        T: Into<Error> + Display + Debug,
    {
        err_resp(e, StatusCode::BAD_REQUEST)
    }

    pub fn forbidden<T>(e: T) -> Response
    where
        T: Into<Error> + Display + Debug,
    {
        err_resp(e, StatusCode::FORBIDDEN)
    }

    pub fn internal_server_error<T>(e: T) -> Response
    where
        T: Into<Error> + Display + Debug,
    {
        err_resp(e, StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn bad_gateway<T>(e: T) -> Response
    where
        T: Into<Error> + Display + Debug,
    {
        err_resp(e, StatusCode::BAD_GATEWAY)
    }

    pub fn service_unavailable<T>(e: T) -> Response
    where
        T: Into<Error> + Display + Debug,
    {
        err_resp(e, StatusCode::SERVICE_UNAVAILABLE)
    }

    pub fn precondition_failed<T>(e: T) -> Response
    where
        T: Into<Error> + Display + Debug,
    {
        err_resp(e, StatusCode::PRECONDITION_FAILED)
    }
}
