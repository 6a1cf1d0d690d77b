//! Reconciler - create-or-patch による冪等な適用と、404 を許容する削除
//!
//! # プロトコル
//! - **apply**: create を試み、conflict なら同じ spec で patch にフォールスルー
//! - **apply_all**: code → workload → exposure → routing の順に適用し、
//!   最初の失敗で止める（適用済みのリソースは巻き戻さない）
//! - **delete_all**: 4 種類すべてを独立に削除し、not-found は「削除済み」扱い

use tracing::{debug, info, warn};

use crate::domain::{DesiredResources, Resource, ResourceKind};
use crate::ports::{ClusterClient, ClusterError};

/// 1 リソース分の適用結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
}

/// Which resource failed, and why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to apply {kind} \"{name}\": {source}")]
pub struct ApplyError {
    pub kind: ResourceKind,
    pub name: String,
    #[source]
    pub source: ClusterError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
    Failed(ClusterError),
}

/// delete_all の結果（種類ごと）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteReport {
    pub outcomes: Vec<(ResourceKind, DeleteOutcome)>,
}

impl DeleteReport {
    pub fn failures(&self) -> impl Iterator<Item = (ResourceKind, &ClusterError)> {
        self.outcomes.iter().filter_map(|(kind, outcome)| match outcome {
            DeleteOutcome::Failed(err) => Some((*kind, err)),
            _ => None,
        })
    }

    /// Every kind is gone, whether deleted now or absent already.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// 1 リソースを収束させる
pub async fn reconcile(cluster: &dyn ClusterClient, resource: &Resource) -> Result<ApplyOutcome, ApplyError> {
    let to_error = |source: ClusterError| ApplyError {
        kind: resource.kind(),
        name: resource.name().to_string(),
        source,
    };

    match cluster.create(resource).await {
        Ok(()) => Ok(ApplyOutcome::Created),
        Err(err) if err.is_conflict() => {
            debug!(kind = %resource.kind(), name = resource.name(), "exists, patching");
            cluster.patch(resource).await.map_err(to_error)?;
            Ok(ApplyOutcome::Updated)
        }
        Err(err) => Err(to_error(err)),
    }
}

/// 4 リソースを作成順に適用
pub async fn apply_all(
    cluster: &dyn ClusterClient,
    desired: &DesiredResources,
) -> Result<Vec<(ResourceKind, ApplyOutcome)>, ApplyError> {
    let mut applied = Vec::with_capacity(ResourceKind::APPLY_ORDER.len());
    for resource in desired.in_apply_order() {
        let outcome = reconcile(cluster, &resource).await?;
        info!(kind = %resource.kind(), name = resource.name(), outcome = ?outcome, "applied");
        applied.push((resource.kind(), outcome));
    }
    Ok(applied)
}

/// 4 種類すべての削除を試みる
///
/// 途中で失敗しても残りの種類の削除は続けます。部分的に作成された app も
/// これで完全に片付きます。
pub async fn delete_all(cluster: &dyn ClusterClient, namespace: &str, desired: &DesiredResources) -> DeleteReport {
    let mut report = DeleteReport::default();
    for resource in desired.in_apply_order().iter().rev() {
        let (kind, name) = (resource.kind(), resource.name());
        let outcome = match cluster.delete(kind, namespace, name).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(err) if err.is_not_found() => {
                debug!(kind = %kind, name, "already absent");
                DeleteOutcome::AlreadyAbsent
            }
            Err(err) => {
                warn!(kind = %kind, name, error = %err, "delete failed");
                DeleteOutcome::Failed(err)
            }
        };
        report.outcomes.push((kind, outcome));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;
    use crate::domain::{App, AppContent, AppId, OwnerId};
    use crate::impls::{ClusterCall, InMemoryCluster, Operation};
    use crate::reconcile::ResourceBuilder;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn desired(code: &str) -> DesiredResources {
        let app = App::new(
            AppId::parse("abc").unwrap(),
            OwnerId::new("t1"),
            "demo".into(),
            AppContent::Single { code: code.into() },
            None,
            BTreeMap::new(),
            None,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        ResourceBuilder::new(&PlatformConfig::default()).build(&app, "postgres://db".into())
    }

    #[tokio::test]
    async fn test_second_apply_patches() {
        let cluster = InMemoryCluster::new();
        let spec = desired("v1");

        let first = apply_all(&cluster, &spec).await.unwrap();
        assert!(first.iter().all(|(_, o)| *o == ApplyOutcome::Created));

        let second = apply_all(&cluster, &spec).await.unwrap();
        assert!(second.iter().all(|(_, o)| *o == ApplyOutcome::Updated));
        assert_eq!(cluster.object_count().await, 4);
    }

    #[tokio::test]
    async fn test_create_order() {
        let cluster = InMemoryCluster::new();
        apply_all(&cluster, &desired("v1")).await.unwrap();
        let kinds: Vec<ResourceKind> = cluster
            .calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                ClusterCall::Create { kind, .. } => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, ResourceKind::APPLY_ORDER.to_vec());
    }

    #[tokio::test]
    async fn test_patch_replaces_content() {
        let cluster = InMemoryCluster::new();
        apply_all(&cluster, &desired("v1")).await.unwrap();
        let next = desired("v2");
        apply_all(&cluster, &next).await.unwrap();
        let stored = cluster
            .get("apps", ResourceKind::CodeBundle, &next.code.metadata.name)
            .await
            .unwrap();
        assert_eq!(stored, Resource::CodeBundle(next.code.clone()));
    }

    #[tokio::test]
    async fn test_other_errors_stop_the_sequence() {
        let cluster = InMemoryCluster::new();
        cluster
            .fail_next(
                Operation::Create,
                ResourceKind::Exposure,
                ClusterError::Api {
                    status: 500,
                    message: "boom".into(),
                },
            )
            .await;

        let err = apply_all(&cluster, &desired("v1")).await.unwrap_err();
        assert_eq!(err.kind, ResourceKind::Exposure);
        // 先に適用されたリソースは残る
        assert_eq!(cluster.object_count().await, 2);
        assert!(cluster.get("apps", ResourceKind::RoutingRule, "app-abc").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_tolerates_absent() {
        let cluster = InMemoryCluster::new();
        let spec = desired("v1");
        reconcile(&cluster, &Resource::CodeBundle(spec.code.clone())).await.unwrap();

        let report = delete_all(&cluster, "apps", &spec).await;
        assert!(report.is_clean());
        assert_eq!(report.outcomes.len(), 4);
        assert!(report
            .outcomes
            .iter()
            .any(|(k, o)| *k == ResourceKind::CodeBundle && *o == DeleteOutcome::Deleted));
        assert_eq!(cluster.object_count().await, 0);

        let again = delete_all(&cluster, "apps", &spec).await;
        assert!(again.outcomes.iter().all(|(_, o)| *o == DeleteOutcome::AlreadyAbsent));
    }

    #[tokio::test]
    async fn test_delete_continues_past_failures() {
        let cluster = InMemoryCluster::new();
        let spec = desired("v1");
        apply_all(&cluster, &spec).await.unwrap();
        cluster
            .fail_next(Operation::Delete, ResourceKind::Workload, ClusterError::Forbidden("rbac".into()))
            .await;

        let report = delete_all(&cluster, "apps", &spec).await;
        let failures: Vec<ResourceKind> = report.failures().map(|(k, _)| k).collect();
        assert_eq!(failures, vec![ResourceKind::Workload]);
        assert_eq!(cluster.object_count().await, 1);
    }
}
