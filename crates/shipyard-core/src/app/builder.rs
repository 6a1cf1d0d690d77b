//! LifecycleBuilder - Lifecycle の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - クラスタ疎通確認の失敗は「クラスタなし」として扱い、検証・履歴参照は動かし続ける

use std::sync::Arc;

use tracing::{info, warn};

use super::lifecycle::Lifecycle;
use crate::config::{ConfigError, PlatformConfig};
use crate::impls::StaticAllowList;
use crate::ports::{
    AllowListSource, AppStore, Clock, ClusterClient, ConnectionStringProvider, IdGenerator, SystemClock, UlidGenerator,
};

/// LifecycleBuilder は Lifecycle を構築
///
/// # 使用例
/// ```ignore
/// let lifecycle = LifecycleBuilder::new(config)
///     .store(store)
///     .credentials(credentials)
///     .cluster(cluster)
///     .build()
///     .await?;
/// ```
///
/// # Fail-fast 設計
/// - store と credentials は必須。不足があれば BuildError を返す
/// - 設定は build() 時に検証する
/// - cluster は任意。ping に失敗したら警告を出して「クラスタなし」で構築する
pub struct LifecycleBuilder {
    config: PlatformConfig,
    store: Option<Arc<dyn AppStore>>,
    credentials: Option<Arc<dyn ConnectionStringProvider>>,
    cluster: Option<Arc<dyn ClusterClient>>,
    allow_list: Option<Arc<dyn AllowListSource>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError は Lifecycle 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing collaborators: {0:?}. These must be provided before build().")]
    MissingCollaborators(Vec<&'static str>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LifecycleBuilder {
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            config,
            store: None,
            credentials: None,
            cluster: None,
            allow_list: None,
            clock: None,
            ids: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn AppStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn ConnectionStringProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// 省略時は組み込みの allow-list
    pub fn allow_list(mut self, allow_list: Arc<dyn AllowListSource>) -> Self {
        self.allow_list = Some(allow_list);
        self
    }

    /// 省略時は SystemClock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 省略時は clock を使う UlidGenerator
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// LifecycleBuilder を構築して Lifecycle を生成
    ///
    /// # 検証
    /// - 必須の協調者（store, credentials）が揃っているか
    /// - 設定が妥当か（PlatformConfig::validate）
    /// - cluster が与えられていれば一度だけ ping する
    pub async fn build(self) -> Result<Lifecycle, BuildError> {
        let mut missing = Vec::new();
        if self.store.is_none() {
            missing.push("store");
        }
        if self.credentials.is_none() {
            missing.push("credentials");
        }
        let (Some(store), Some(credentials)) = (self.store, self.credentials) else {
            return Err(BuildError::MissingCollaborators(missing));
        };

        self.config.validate()?;

        let cluster = match self.cluster {
            Some(cluster) => match cluster.ping().await {
                Ok(()) => {
                    info!(namespace = %self.config.cluster.namespace, "cluster connected");
                    Some(cluster)
                }
                Err(err) => {
                    warn!(error = %err, "cluster unavailable; deployments will fail until it is reachable");
                    None
                }
            },
            None => {
                warn!("no cluster client configured; running without a cluster");
                None
            }
        };

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(clock.clone())),
        };
        let allow_list: Arc<dyn AllowListSource> = match self.allow_list {
            Some(allow_list) => allow_list,
            None => Arc::new(StaticAllowList::none()),
        };

        Ok(Lifecycle {
            config: self.config,
            store,
            credentials,
            cluster,
            allow_list,
            clock,
            ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryAppStore, InMemoryCluster, StaticConnectionStrings};

    #[tokio::test]
    async fn test_build_success() {
        let lifecycle = LifecycleBuilder::new(PlatformConfig::default())
            .store(Arc::new(InMemoryAppStore::new()))
            .credentials(Arc::new(StaticConnectionStrings::new()))
            .cluster(Arc::new(InMemoryCluster::new()))
            .build()
            .await
            .unwrap();
        assert!(lifecycle.cluster_available());
    }

    #[tokio::test]
    async fn test_build_missing_collaborators() {
        let result = LifecycleBuilder::new(PlatformConfig::default()).build().await;
        assert!(matches!(
            result,
            Err(BuildError::MissingCollaborators(missing)) if missing == vec!["store", "credentials"]
        ));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let mut config = PlatformConfig::default();
        config.limits.history_limit = 0;
        let result = LifecycleBuilder::new(config)
            .store(Arc::new(InMemoryAppStore::new()))
            .credentials(Arc::new(StaticConnectionStrings::new()))
            .build()
            .await;
        assert!(matches!(result, Err(BuildError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_cluster_degrades() {
        let lifecycle = LifecycleBuilder::new(PlatformConfig::default())
            .store(Arc::new(InMemoryAppStore::new()))
            .credentials(Arc::new(StaticConnectionStrings::new()))
            .cluster(Arc::new(InMemoryCluster::unreachable()))
            .build()
            .await
            .unwrap();
        assert!(!lifecycle.cluster_available());
    }
}
