//! Lifecycle Orchestrator - create / update / rollback / delete の順序付け
//!
//! # パイプライン
//! 検証 → スナップショット → 永続化（deploying）→ 組み立て → 4 リソースの適用
//! → running / error への遷移と保存
//!
//! # 学習ポイント
//! - 検証に失敗したら永続化もクラスタ呼び出しも一切しない
//! - 適用に失敗しても生成済みの app_id はそのまま残す（update で再試行できる）
//! - クラスタがなくても検証・下書き・履歴参照は動く

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::PlatformConfig;
use crate::domain::{
    App, AppChanges, AppContent, AppId, AppSpec, DatabaseId, DraftContent, OwnerId, PlatformError, ResourceKind,
    VersionSummary,
};
use crate::ports::{
    AllowListSource, AppStore, Clock, ClusterClient, ClusterError, ConnectionStringProvider, CredentialError,
    IdGenerator, StoreError,
};
use crate::reconcile::{
    DeleteOutcome, DeleteReport, ResourceBuilder, apply_all, check_env_vars, delete_all, deployment_url,
};
use crate::validator::{AllowedImports, ValidationResult, validate_content};

use super::translate::translate;

pub(super) fn store_error(err: StoreError) -> PlatformError {
    match err {
        StoreError::NotFound(app_id) => PlatformError::NotFound(app_id),
        other => PlatformError::Store(other.to_string()),
    }
}

pub(super) fn cluster_unavailable() -> ClusterError {
    ClusterError::Unavailable("cluster client is not initialized".to_string())
}

/// Lifecycle はアプリのライフサイクル操作を提供
///
/// [`LifecycleBuilder`](super::LifecycleBuilder) で構築します。
pub struct Lifecycle {
    pub(super) config: PlatformConfig,
    pub(super) store: Arc<dyn AppStore>,
    pub(super) credentials: Arc<dyn ConnectionStringProvider>,
    pub(super) cluster: Option<Arc<dyn ClusterClient>>,
    pub(super) allow_list: Arc<dyn AllowListSource>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) ids: Arc<dyn IdGenerator>,
}

impl Lifecycle {
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// 構築時の ping に成功したか
    pub fn cluster_available(&self) -> bool {
        self.cluster.is_some()
    }

    pub(super) async fn load(&self, app_id: &AppId) -> Result<App, PlatformError> {
        self.store
            .get(app_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| PlatformError::NotFound(app_id.clone()))
    }

    async fn load_live(&self, app_id: &AppId) -> Result<App, PlatformError> {
        let app = self.load(app_id).await?;
        app.ensure_not_deleted()?;
        Ok(app)
    }

    async fn allowed_imports(&self) -> AllowedImports {
        AllowedImports::from_override(self.allow_list.allowed_imports().await)
    }

    async fn check_content(&self, content: &AppContent) -> Result<(), PlatformError> {
        let allowed = self.allowed_imports().await;
        validate_content(content, &allowed, &self.config.limits).map_err(|failure| {
            info!(reason = %failure, "validation rejected");
            PlatformError::ValidationFailed(failure)
        })
    }

    async fn resolve_database(&self, owner_id: &OwnerId, database_id: Option<&DatabaseId>) -> Result<String, PlatformError> {
        self.credentials
            .resolve(owner_id, database_id)
            .await
            .map_err(|err| match err {
                CredentialError::UnknownDatabase { .. } => PlatformError::InvalidDatabase(err.to_string()),
                CredentialError::Backend(_) => PlatformError::deployment_failed(None, err.to_string()),
            })
    }

    /// 4 リソースを適用し、結果に応じて running / error に遷移して保存
    async fn reconcile_app(&self, app: &mut App, database_url: String, clear_draft: bool) -> Result<(), PlatformError> {
        let desired = ResourceBuilder::new(&self.config).build(app, database_url);
        let applied = match &self.cluster {
            Some(cluster) => apply_all(cluster.as_ref(), &desired).await.map_err(|err| err.source),
            None => Err(cluster_unavailable()),
        };

        let now = self.clock.now();
        match applied {
            Ok(_) => {
                if clear_draft {
                    app.clear_draft(now);
                }
                app.mark_running(deployment_url(&app.app_id, &self.config), now)?;
                self.store.save(app).await.map_err(store_error)?;
                info!(app_id = %app.app_id, hash = %app.content_hash(), "app running");
                Ok(())
            }
            Err(err) => {
                let message = translate(&err.to_string());
                warn!(app_id = %app.app_id, error = %err, "reconcile failed");
                app.mark_error(message.clone(), now)?;
                self.store.save(app).await.map_err(store_error)?;
                Err(PlatformError::deployment_failed(Some(app.app_id.clone()), message))
            }
        }
    }

    /// 現在のデプロイ内容を履歴に退避し、新しい内容を保存してから適用する
    async fn redeploy(
        &self,
        mut app: App,
        content: Option<AppContent>,
        database_url: String,
        clear_draft: bool,
    ) -> Result<App, PlatformError> {
        let now = self.clock.now();
        app.begin_deploy(now)?;
        if let Some(content) = content {
            app.replace_deployed(content, self.config.limits.history_limit, now);
        }
        self.store.save(&app).await.map_err(store_error)?;
        info!(app_id = %app.app_id, history = app.version_history.len(), "redeploying");

        self.reconcile_app(&mut app, database_url, clear_draft).await?;
        Ok(app)
    }

    /// 検証のみ（クラスタ不要）
    pub async fn validate(&self, content: &AppContent) -> ValidationResult {
        let allowed = self.allowed_imports().await;
        validate_content(content, &allowed, &self.config.limits).into()
    }

    #[instrument(skip_all, fields(owner = %spec.owner_id))]
    pub async fn create(&self, spec: AppSpec) -> Result<App, PlatformError> {
        let content = spec.content()?;
        check_env_vars(&spec.env_vars)?;
        self.check_content(&content).await?;
        let database_url = self.resolve_database(&spec.owner_id, spec.database_id.as_ref()).await?;

        let app_id = self.ids.generate_app_id();
        let name = spec
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("app-{app_id}"));
        let mut app = App::new(
            app_id,
            spec.owner_id,
            name,
            content,
            spec.framework,
            spec.env_vars,
            spec.database_id,
            self.clock.now(),
        );
        self.store.insert(&app).await.map_err(store_error)?;
        info!(app_id = %app.app_id, mode = ?app.mode, "app created");

        self.reconcile_app(&mut app, database_url, false).await?;
        Ok(app)
    }

    /// 変更を適用
    ///
    /// コンテンツ・環境変数・DB バインドのいずれかが変わったときだけ再デプロイします。
    /// 表示名だけの変更は保存のみです。
    #[instrument(skip_all, fields(app_id = %app_id))]
    pub async fn update(&self, app_id: &AppId, changes: AppChanges) -> Result<App, PlatformError> {
        let mut app = self.load_live(app_id).await?;

        let content = changes.content_for(&app.deployed)?;
        if let Some(env_vars) = &changes.env_vars {
            check_env_vars(env_vars)?;
        }
        if let Some(content) = &content {
            self.check_content(content).await?;
        }

        let content_changed = content.as_ref().is_some_and(|c| *c != app.deployed);
        let env_changed = changes.env_vars.as_ref().is_some_and(|env| *env != app.env_vars);
        let db_changed = changes
            .database_id
            .as_ref()
            .is_some_and(|db| Some(db) != app.database_id.as_ref());
        let renamed = changes.name.as_ref().is_some_and(|name| *name != app.name);

        if let Some(name) = changes.name {
            app.name = name;
        }

        if !(content_changed || env_changed || db_changed) {
            if renamed {
                app.updated_at = self.clock.now();
                self.store.save(&app).await.map_err(store_error)?;
                info!("renamed");
            }
            return Ok(app);
        }

        let database_id = if db_changed {
            changes.database_id
        } else {
            app.database_id.clone()
        };
        let database_url = self.resolve_database(&app.owner_id, database_id.as_ref()).await?;

        if let Some(env_vars) = changes.env_vars {
            app.env_vars = env_vars;
        }
        app.database_id = database_id;

        let content = content.filter(|_| content_changed);
        self.redeploy(app, content, database_url, content_changed).await
    }

    /// 履歴の `index` 番目の内容に戻す
    ///
    /// 履歴の内容も改めて検証します（allow-list が後から変わっている可能性があるため）。
    #[instrument(skip_all, fields(app_id = %app_id, index = index))]
    pub async fn rollback(&self, app_id: &AppId, index: usize) -> Result<App, PlatformError> {
        let app = self.load_live(app_id).await?;
        let content = app
            .version_history
            .get(index)
            .map(|entry| entry.content.clone())
            .ok_or(PlatformError::InvalidVersion {
                index,
                max: app.version_history.len(),
            })?;

        self.check_content(&content).await?;
        let database_url = self.resolve_database(&app.owner_id, app.database_id.as_ref()).await?;
        self.redeploy(app, Some(content), database_url, true).await
    }

    /// リソースを削除して deleted に遷移
    ///
    /// クラスタ側の削除失敗は記録して返しますが、deleted への遷移は止めません。
    /// 削除済みの app に対して再度呼ぶと、残ったリソースの削除だけを再試行します。
    #[instrument(skip_all, fields(app_id = %app_id))]
    pub async fn delete(&self, app_id: &AppId) -> Result<DeleteReport, PlatformError> {
        let mut app = self.load(app_id).await?;
        let desired = ResourceBuilder::new(&self.config).build(&app, String::new());
        let namespace = &self.config.cluster.namespace;

        let report = match &self.cluster {
            Some(cluster) => delete_all(cluster.as_ref(), namespace, &desired).await,
            None => DeleteReport {
                outcomes: ResourceKind::APPLY_ORDER
                    .iter()
                    .rev()
                    .map(|kind| (*kind, DeleteOutcome::Failed(cluster_unavailable())))
                    .collect(),
            },
        };
        for (kind, err) in report.failures() {
            warn!(kind = %kind, error = %err, "resource left behind");
        }

        if !app.status.is_terminal() {
            app.mark_deleted(self.clock.now())?;
            self.store.save(&app).await.map_err(store_error)?;
            info!(clean = report.is_clean(), "app deleted");
        }
        Ok(report)
    }

    /// 下書きを検証して保存（デプロイ済みと同じ内容なら下書きを消す）
    #[instrument(skip_all, fields(app_id = %app_id))]
    pub async fn save_draft(&self, app_id: &AppId, draft: DraftContent) -> Result<App, PlatformError> {
        let mut app = self.load_live(app_id).await?;
        let content = draft.into_content(&app.deployed)?;
        self.check_content(&content).await?;

        app.set_draft(content, self.clock.now());
        self.store.save(&app).await.map_err(store_error)?;
        Ok(app)
    }

    pub async fn discard_draft(&self, app_id: &AppId) -> Result<App, PlatformError> {
        let mut app = self.load_live(app_id).await?;
        app.clear_draft(self.clock.now());
        self.store.save(&app).await.map_err(store_error)?;
        Ok(app)
    }

    /// 下書きを update と同じ経路でデプロイ
    #[instrument(skip_all, fields(app_id = %app_id))]
    pub async fn deploy_draft(&self, app_id: &AppId) -> Result<App, PlatformError> {
        let app = self.load_live(app_id).await?;
        let Some(draft) = app.draft.clone() else {
            return Err(PlatformError::InvalidRequest("no draft to deploy".to_string()));
        };

        self.check_content(&draft).await?;
        let database_url = self.resolve_database(&app.owner_id, app.database_id.as_ref()).await?;
        self.redeploy(app, Some(draft), database_url, true).await
    }

    /// デプロイ済みの内容から新しい app を作る（新しい app_id、履歴は空）
    ///
    /// 別テナントへ複製する場合、DB バインドは引き継ぎません。
    #[instrument(skip_all, fields(app_id = %app_id))]
    pub async fn clone_app(&self, app_id: &AppId, new_owner: Option<OwnerId>) -> Result<App, PlatformError> {
        let source = self.load(app_id).await?;
        let owner_id = new_owner.unwrap_or_else(|| source.owner_id.clone());
        let database_id = source.database_id.filter(|_| owner_id == source.owner_id);

        let (code, files, entrypoint) = match source.deployed {
            AppContent::Single { code } => (Some(code), None, None),
            AppContent::Multi { files, entrypoint } => (None, Some(files), Some(entrypoint)),
        };
        let spec = AppSpec {
            owner_id,
            name: Some(format!("{} (copy)", source.name)),
            code,
            files,
            entrypoint,
            framework: source.framework,
            env_vars: source.env_vars,
            database_id,
        };
        self.create(spec).await
    }

    pub async fn get(&self, app_id: &AppId) -> Result<App, PlatformError> {
        self.load(app_id).await
    }

    /// 履歴一覧（新しい順、クラスタ不要）
    pub async fn versions(&self, app_id: &AppId) -> Result<Vec<VersionSummary>, PlatformError> {
        Ok(self.load(app_id).await?.version_history.summaries())
    }

    /// 所有者の app 一覧（監査用に deleted も含む）
    pub async fn list_apps(&self, owner_id: &OwnerId) -> Result<Vec<App>, PlatformError> {
        self.store.list_by_owner(owner_id).await.map_err(store_error)
    }
}
