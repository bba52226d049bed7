//! Composite status resolvers.
//!
//! These fold many child statuses into one parent status plus a human
//! reason. They are total over their input enums and perform no I/O; every
//! inbound status message funnels through one of them before the parent row
//! is written.

use gantry_common::messages::{
    AssignmentStatus, ComponentStatus, ConfigMapStatus, NamespaceStatus, QuotaStatus,
};
use serde::{Deserialize, Serialize};

/// Lifecycle of a secret or storage, rolled up from its project assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollupStatus {
    Unassigned,
    Pending,
    Synced,
    PartiallySynced,
    SyncedError,
    Failed,
    Deleting,
    Deleted,
    DeleteFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    Pending,
    Failed,
    PartiallyReady,
    Ready,
    Deleting,
}

/// Roll child assignment statuses up into the parent secret/storage status.
pub fn resolve_rollup_status(
    parent: RollupStatus,
    children: &[AssignmentStatus],
) -> (RollupStatus, Option<String>) {
    if parent == RollupStatus::Deleting {
        if children.is_empty() {
            return (RollupStatus::Deleted, None);
        }
        if children.iter().any(|s| *s == AssignmentStatus::DeleteFailed) {
            return (
                RollupStatus::DeleteFailed,
                Some("Some project assignments failed to be deleted".into()),
            );
        }
        return (RollupStatus::Deleting, None);
    }

    if children.is_empty() {
        return (RollupStatus::Unassigned, None);
    }

    if children.iter().any(|s| *s == AssignmentStatus::DeleteFailed) {
        return (
            RollupStatus::DeleteFailed,
            Some("Some project assignments failed to be deleted".into()),
        );
    }

    if children.iter().any(|s| *s == AssignmentStatus::Failed) {
        return (
            RollupStatus::Failed,
            Some("Some project assignments are in a failed state".into()),
        );
    }

    if children
        .iter()
        .any(|s| matches!(s, AssignmentStatus::SyncedError | AssignmentStatus::Unknown))
    {
        return (
            RollupStatus::SyncedError,
            Some("Some project assignments have failed to sync".into()),
        );
    }

    if children.iter().all(|s| *s == AssignmentStatus::Synced) {
        return (RollupStatus::Synced, None);
    }

    // Cluster removed something we did not ask it to.
    if children.iter().any(|s| *s == AssignmentStatus::Deleted) {
        return (
            RollupStatus::SyncedError,
            Some("One or more project assignments have been deleted unexpectedly".into()),
        );
    }

    if children.iter().any(|s| *s == AssignmentStatus::Synced) {
        return (RollupStatus::PartiallySynced, None);
    }

    (
        RollupStatus::SyncedError,
        Some("Unknown project assignment states detected".into()),
    )
}

/// Project status from its two components: the namespace and the quota.
pub fn resolve_project_status(
    namespace_status: NamespaceStatus,
    namespace_reason: Option<&str>,
    quota_status: QuotaStatus,
    quota_reason: Option<&str>,
    project_status: ProjectStatus,
) -> (ProjectStatus, String) {
    if project_status == ProjectStatus::Deleting {
        return (ProjectStatus::Deleting, "Project is being deleted.".into());
    }

    let mut reasons = Vec::new();
    if let Some(reason) = namespace_reason {
        reasons.push(format!("namespace: {reason}"));
    }
    if let Some(reason) = quota_reason {
        reasons.push(format!("quota: {reason}"));
    }
    let reason_text = reasons.join("; ");

    let namespace_failed = matches!(
        namespace_status,
        NamespaceStatus::Failed | NamespaceStatus::DeleteFailed
    );
    let quota_failed = quota_status == QuotaStatus::Failed;
    if namespace_failed || quota_failed {
        let mut failed = Vec::new();
        if namespace_failed {
            failed.push("namespace");
        }
        if quota_failed {
            failed.push("quota");
        }
        return (
            ProjectStatus::Failed,
            format!("Failed components: {}. {reason_text}", failed.join(", ")),
        );
    }

    if namespace_status == NamespaceStatus::Active && quota_status == QuotaStatus::Ready {
        return (ProjectStatus::Ready, format!("All components ready. {reason_text}"));
    }

    if namespace_status == NamespaceStatus::Pending && quota_status == QuotaStatus::Pending {
        return (
            ProjectStatus::Pending,
            format!("All components pending. {reason_text}"),
        );
    }

    let ready: Vec<&str> = [
        ("namespace", namespace_status == NamespaceStatus::Active),
        ("quota", quota_status == QuotaStatus::Ready),
    ]
    .iter()
    .filter_map(|(name, ok)| ok.then_some(*name))
    .collect();
    let pending: Vec<&str> = [
        ("namespace", namespace_status == NamespaceStatus::Pending),
        ("quota", quota_status == QuotaStatus::Pending),
    ]
    .iter()
    .filter_map(|(name, ok)| ok.then_some(*name))
    .collect();

    if !ready.is_empty() && !pending.is_empty() {
        return (
            ProjectStatus::PartiallyReady,
            format!(
                "Ready: {}; Pending: {}. {reason_text}",
                ready.join(", "),
                pending.join(", ")
            ),
        );
    }

    (
        ProjectStatus::Failed,
        format!("Unknown component states detected. {reason_text}"),
    )
}

/// Composite status of a project-storage from its configmap and the linked
/// project-secret assignment.
pub fn resolve_project_storage_status(
    configmap_status: ConfigMapStatus,
    configmap_reason: Option<&str>,
    secret_status: AssignmentStatus,
    secret_reason: Option<&str>,
) -> (AssignmentStatus, String) {
    let mut reasons = Vec::new();
    if let Some(reason) = configmap_reason {
        reasons.push(format!("configmap: {reason}"));
    }
    if let Some(reason) = secret_reason {
        reasons.push(format!("secret: {reason}"));
    }
    let reason_text = reasons.join("; ");

    let configmap_failed = configmap_status == ConfigMapStatus::Failed;
    let secret_failed = secret_status == AssignmentStatus::Failed;
    if configmap_failed || secret_failed {
        let mut failed = Vec::new();
        if configmap_failed {
            failed.push("configmap");
        }
        if secret_failed {
            failed.push("secret");
        }
        return (
            AssignmentStatus::Failed,
            format!("Failed components: {}. {reason_text}", failed.join(", ")),
        );
    }

    match (configmap_status, secret_status) {
        (ConfigMapStatus::Added, AssignmentStatus::Synced) => (
            AssignmentStatus::Synced,
            format!("All components synced. {reason_text}"),
        ),
        (ConfigMapStatus::Added, AssignmentStatus::Pending) => (
            AssignmentStatus::Pending,
            format!("Project secret pending. {reason_text}"),
        ),
        (ConfigMapStatus::Added, AssignmentStatus::SyncedError | AssignmentStatus::Unknown)
        | (ConfigMapStatus::Deleted, AssignmentStatus::Synced) => (
            AssignmentStatus::SyncedError,
            format!("Mixed component states. {reason_text}"),
        ),
        _ => (
            AssignmentStatus::Failed,
            format!("Unknown component states detected. {reason_text}"),
        ),
    }
}

/// Workload status from its component statuses.
pub fn resolve_workload_status(
    components: &[ComponentStatus],
    deleting: bool,
) -> (gantry_common::messages::WorkloadStatus, String) {
    use gantry_common::messages::WorkloadStatus;

    if deleting {
        if components.iter().all(|s| *s == ComponentStatus::Deleted) {
            return (WorkloadStatus::Deleted, "All components deleted".into());
        }
        if components.iter().any(|s| *s == ComponentStatus::DeleteFailed) {
            return (
                WorkloadStatus::Failed,
                "Some components failed to delete".into(),
            );
        }
        return (WorkloadStatus::Deleting, "Components are being deleted".into());
    }

    if components.is_empty() {
        return (WorkloadStatus::Pending, "No components reported yet".into());
    }

    if components
        .iter()
        .any(|s| matches!(s, ComponentStatus::Failed | ComponentStatus::CreateFailed))
    {
        return (WorkloadStatus::Failed, "One or more components failed".into());
    }

    if components.iter().all(|s| *s == ComponentStatus::Complete) {
        return (WorkloadStatus::Complete, "All components complete".into());
    }

    if components
        .iter()
        .any(|s| matches!(s, ComponentStatus::Running | ComponentStatus::Ready))
    {
        return (WorkloadStatus::Running, "Components are running".into());
    }

    (WorkloadStatus::Pending, "Components are pending".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use AssignmentStatus::*;
    use gantry_common::messages::WorkloadStatus;

    #[test]
    fn deleting_parent_with_no_children_is_deleted() {
        assert_eq!(
            resolve_rollup_status(RollupStatus::Deleting, &[]).0,
            RollupStatus::Deleted
        );
    }

    #[test]
    fn deleting_parent_stays_deleting_until_children_go() {
        assert_eq!(
            resolve_rollup_status(RollupStatus::Deleting, &[Deleting, Deleted]).0,
            RollupStatus::Deleting
        );
        assert_eq!(
            resolve_rollup_status(RollupStatus::Deleting, &[DeleteFailed, Deleted]).0,
            RollupStatus::DeleteFailed
        );
    }

    #[test]
    fn no_children_means_unassigned() {
        assert_eq!(
            resolve_rollup_status(RollupStatus::Synced, &[]).0,
            RollupStatus::Unassigned
        );
    }

    #[test]
    fn failure_outranks_sync_errors() {
        assert_eq!(
            resolve_rollup_status(RollupStatus::Pending, &[Failed, SyncedError, Synced]).0,
            RollupStatus::Failed
        );
        assert_eq!(
            resolve_rollup_status(RollupStatus::Pending, &[SyncedError, Synced]).0,
            RollupStatus::SyncedError
        );
        assert_eq!(
            resolve_rollup_status(RollupStatus::Pending, &[Unknown, Synced]).0,
            RollupStatus::SyncedError
        );
    }

    #[test]
    fn all_synced_is_synced() {
        assert_eq!(
            resolve_rollup_status(RollupStatus::Pending, &[Synced, Synced]).0,
            RollupStatus::Synced
        );
    }

    #[test]
    fn unsolicited_delete_is_a_sync_error() {
        let (status, reason) = resolve_rollup_status(RollupStatus::Synced, &[Deleted, Synced]);
        assert_eq!(status, RollupStatus::SyncedError);
        assert!(reason.unwrap().contains("unexpectedly"));
    }

    #[test]
    fn partial_sync_when_some_children_are_behind() {
        assert_eq!(
            resolve_rollup_status(RollupStatus::Pending, &[Synced, Pending]).0,
            RollupStatus::PartiallySynced
        );
    }

    #[test]
    fn all_pending_has_no_clean_bucket_and_reports_unknown_states() {
        let (status, reason) = resolve_rollup_status(RollupStatus::Pending, &[Pending, Pending]);
        assert_eq!(status, RollupStatus::SyncedError);
        assert!(reason.unwrap().contains("Unknown"));
    }

    #[test]
    fn deleting_children_of_a_live_parent_fall_through_to_error() {
        // Not deleting the parent but a child is mid-delete: no clean bucket.
        assert_eq!(
            resolve_rollup_status(RollupStatus::Synced, &[Deleting]).0,
            RollupStatus::SyncedError
        );
    }

    #[test]
    fn project_deleting_wins() {
        let (status, _) = resolve_project_status(
            NamespaceStatus::Active,
            None,
            QuotaStatus::Ready,
            None,
            ProjectStatus::Deleting,
        );
        assert_eq!(status, ProjectStatus::Deleting);
    }

    #[test]
    fn project_failure_lists_failed_components() {
        let (status, reason) = resolve_project_status(
            NamespaceStatus::Active,
            None,
            QuotaStatus::Failed,
            Some("quota drifted"),
            ProjectStatus::Ready,
        );
        assert_eq!(status, ProjectStatus::Failed);
        assert!(reason.contains("quota"));
        assert!(reason.contains("quota drifted"));
    }

    #[test]
    fn project_ready_when_both_components_ready() {
        let (status, _) = resolve_project_status(
            NamespaceStatus::Active,
            None,
            QuotaStatus::Ready,
            None,
            ProjectStatus::Pending,
        );
        assert_eq!(status, ProjectStatus::Ready);
    }

    #[test]
    fn project_partially_ready_on_mixed_states() {
        let (status, reason) = resolve_project_status(
            NamespaceStatus::Active,
            Some("namespace is active"),
            QuotaStatus::Pending,
            None,
            ProjectStatus::Pending,
        );
        assert_eq!(status, ProjectStatus::PartiallyReady);
        assert!(reason.contains("Ready: namespace"));
        assert!(reason.contains("Pending: quota"));
    }

    #[test]
    fn project_unmatched_combination_fails_instead_of_dropping() {
        let (status, _) = resolve_project_status(
            NamespaceStatus::Terminating,
            None,
            QuotaStatus::Ready,
            None,
            ProjectStatus::Ready,
        );
        assert_eq!(status, ProjectStatus::Failed);
    }

    #[test]
    fn storage_composite_follows_the_permutation_table() {
        let cases = [
            (ConfigMapStatus::Added, Synced, AssignmentStatus::Synced),
            (ConfigMapStatus::Added, Pending, AssignmentStatus::Pending),
            (ConfigMapStatus::Added, SyncedError, AssignmentStatus::SyncedError),
            (ConfigMapStatus::Failed, Synced, AssignmentStatus::Failed),
            (ConfigMapStatus::Added, Failed, AssignmentStatus::Failed),
            (ConfigMapStatus::Deleted, Pending, AssignmentStatus::Failed),
        ];
        for (configmap, secret, expected) in cases {
            let (status, _) = resolve_project_storage_status(configmap, None, secret, None);
            assert_eq!(status, expected, "{configmap:?} + {secret:?}");
        }
    }

    #[test]
    fn workload_rollup_covers_the_main_paths() {
        use ComponentStatus as C;
        assert_eq!(resolve_workload_status(&[], false).0, WorkloadStatus::Pending);
        assert_eq!(
            resolve_workload_status(&[C::Running, C::Pending], false).0,
            WorkloadStatus::Running
        );
        assert_eq!(
            resolve_workload_status(&[C::Complete, C::Complete], false).0,
            WorkloadStatus::Complete
        );
        assert_eq!(
            resolve_workload_status(&[C::CreateFailed, C::Running], false).0,
            WorkloadStatus::Failed
        );
        assert_eq!(
            resolve_workload_status(&[C::Deleted, C::Deleted], true).0,
            WorkloadStatus::Deleted
        );
        assert_eq!(
            resolve_workload_status(&[C::Deleted, C::Running], true).0,
            WorkloadStatus::Deleting
        );
    }
}
