//! Status - ステータスクエリ（読み取り側）
//!
//! Pod の状態とクラスタイベントから、ユーザー向けのフェーズを組み立てます。
//! 書き込みは deploying 中の deploy_stage の更新だけです。

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::lifecycle::{Lifecycle, cluster_unavailable, store_error};
use super::translate::translate;
use crate::domain::{AppId, AppStatus, ClusterEvent, Phase, PlatformError};
use crate::ports::{ClusterClient, ClusterError};
use crate::reconcile::ResourceBuilder;
use crate::reconcile::builder::workload_name;
use crate::status::{derive_phase, pod_readiness};

/// get_status の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub phase: Phase,
    pub ready: bool,
    pub restart_count: u32,
}

/// get_events の結果（新しい順）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsReport {
    pub events: Vec<ClusterEvent>,
    pub phase: Phase,
}

fn deployment_failed(app_id: &AppId, err: ClusterError) -> PlatformError {
    PlatformError::deployment_failed(Some(app_id.clone()), translate(&err.to_string()))
}

impl Lifecycle {
    fn require_cluster(&self, app_id: &AppId) -> Result<&dyn ClusterClient, PlatformError> {
        self.cluster
            .as_deref()
            .ok_or_else(|| deployment_failed(app_id, cluster_unavailable()))
    }

    /// Pod 単位の状態
    ///
    /// Pod がまだない、または Pending の間はイベントから導出したフェーズを返します。
    /// 複数の Pod がある（ロールアウト中）場合は ready な Pod を優先します。
    pub async fn get_status(&self, app_id: &AppId) -> Result<StatusReport, PlatformError> {
        let mut app = self.load(app_id).await?;
        let cluster = self.require_cluster(app_id)?;
        let namespace = &self.config.cluster.namespace;

        let selector = ResourceBuilder::new(&self.config).selector(&app.app_id);
        let pods = cluster
            .list_pods(namespace, &selector)
            .await
            .map_err(|err| deployment_failed(app_id, err))?;
        let readiness = pods
            .iter()
            .map(pod_readiness)
            .max_by_key(|r| (r.ready, std::cmp::Reverse(r.restart_count)));

        let report = match readiness {
            Some(r) if r.phase != Phase::Pending => StatusReport {
                phase: r.phase,
                ready: r.ready,
                restart_count: r.restart_count,
            },
            other => {
                let events = cluster
                    .list_events(namespace, &workload_name(&app.app_id))
                    .await
                    .map_err(|err| deployment_failed(app_id, err))?;
                StatusReport {
                    phase: derive_phase(&events),
                    ready: false,
                    restart_count: other.map_or(0, |r| r.restart_count),
                }
            }
        };

        if app.status == AppStatus::Deploying && app.deploy_stage != Some(report.phase) {
            debug!(app_id = %app.app_id, stage = %report.phase, "deploy stage advanced");
            app.deploy_stage = Some(report.phase);
            self.store.save(&app).await.map_err(store_error)?;
        }
        Ok(report)
    }

    /// 最新 `limit` 件のイベントと、それらから導出したフェーズ
    pub async fn get_events(&self, app_id: &AppId, limit: usize) -> Result<EventsReport, PlatformError> {
        let app = self.load(app_id).await?;
        let cluster = self.require_cluster(app_id)?;

        let mut events = cluster
            .list_events(&self.config.cluster.namespace, &workload_name(&app.app_id))
            .await
            .map_err(|err| deployment_failed(app_id, err))?;
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);

        let phase = derive_phase(&events);
        Ok(EventsReport { events, phase })
    }
}
