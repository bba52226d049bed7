use crate::error::{ApiError, ApiResult};

pub const MAX_PROJECTS_PER_CLUSTER: i64 = 1000;

/// Name of the synthetic cluster queue holding unallocated capacity. It is
/// always present on the cluster, which is also why the name is restricted.
pub const DEFAULT_CATCH_ALL_QUOTA_NAME: &str = "kaiwo";

/// Group names reserved on the identity provider by the platform team.
pub const RESERVED_GROUP_NAMES: [&str; 2] = ["minio-users", "platformadmins"];

/// Kserve appends `-predictor-{namespace}` to workload names; 41 keeps the
/// result under the 63-character Kubernetes name limit.
pub const MAX_PROJECT_NAME_LENGTH: usize = 41;
pub const MIN_NAME_LENGTH: usize = 2;
pub const MAX_SUBDOMAIN_NAME_LENGTH: usize = 253;

fn is_dns_label(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    let ok_edge = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let ok_inner = |b: u8| ok_edge(b) || b == b'-';
    ok_edge(bytes[0])
        && ok_edge(bytes[bytes.len() - 1])
        && bytes.iter().all(|&b| ok_inner(b))
}

pub fn validate_project_name(name: &str) -> ApiResult<()> {
    if name.len() < MIN_NAME_LENGTH || name.len() > MAX_PROJECT_NAME_LENGTH {
        return Err(ApiError::validation(format!(
            "Project name must be between {MIN_NAME_LENGTH} and {MAX_PROJECT_NAME_LENGTH} characters"
        )));
    }
    if !is_dns_label(name) {
        return Err(ApiError::validation(
            "Project name must consist of lowercase alphanumeric characters or '-', \
             and start and end with an alphanumeric character",
        ));
    }
    if name == DEFAULT_CATCH_ALL_QUOTA_NAME || RESERVED_GROUP_NAMES.contains(&name) {
        return Err(ApiError::validation(format!("Project name {name} is restricted")));
    }
    Ok(())
}

/// Secret and storage names follow the DNS subdomain form.
pub fn validate_subdomain_name(kind: &str, name: &str) -> ApiResult<()> {
    if name.len() < MIN_NAME_LENGTH || name.len() > MAX_SUBDOMAIN_NAME_LENGTH {
        return Err(ApiError::validation(format!(
            "{kind} name must be between {MIN_NAME_LENGTH} and {MAX_SUBDOMAIN_NAME_LENGTH} characters"
        )));
    }
    if !name.split('.').all(is_dns_label) {
        return Err(ApiError::validation(format!(
            "{kind} name must be a lowercase DNS subdomain"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_project_names() {
        assert!(validate_project_name("test-a").is_ok());
        assert!(validate_project_name("a1").is_ok());
        assert!(validate_project_name(&"a".repeat(41)).is_ok());
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(validate_project_name("a").is_err());
        assert!(validate_project_name(&"a".repeat(42)).is_err());
        assert!(validate_project_name("-leading").is_err());
        assert!(validate_project_name("trailing-").is_err());
        assert!(validate_project_name("Upper").is_err());
        assert!(validate_project_name("under_score").is_err());
    }

    #[test]
    fn rejects_restricted_names() {
        for name in ["kaiwo", "minio-users", "platformadmins"] {
            assert!(validate_project_name(name).is_err(), "{name} should be restricted");
        }
    }

    #[test]
    fn subdomain_names_allow_dots() {
        assert!(validate_subdomain_name("Secret", "hf-token.prod").is_ok());
        assert!(validate_subdomain_name("Secret", "bad..dots").is_err());
        assert!(validate_subdomain_name("Storage", "x").is_err());
    }
}
