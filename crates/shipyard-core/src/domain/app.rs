//! App - テナントが所有する配備単位
//!
//! # 学習ポイント
//! - 状態遷移はメソッド経由のみ（`AppStatus::can_transition_to` で一元管理）
//! - `deployed` と `draft` を分けて「未公開の変更」を表現

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::PlatformError;
use super::events::Phase;
use super::ids::{AppId, DatabaseId, OwnerId};
use super::state::AppStatus;
use super::version::{self, VersionHistory};

/// Content shape of an app. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Single,
    Multi,
}

/// Web framework a multi-file app is written against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    FastApi,
    FastHtml,
    Flask,
}

impl Framework {
    pub fn as_str(self) -> &'static str {
        match self {
            Framework::FastApi => "fastapi",
            Framework::FastHtml => "fasthtml",
            Framework::Flask => "flask",
        }
    }
}

/// 配備可能なソース（code と files のどちらか一方だけ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AppContent {
    Single {
        code: String,
    },
    Multi {
        files: BTreeMap<String, String>,
        entrypoint: String,
    },
}

impl AppContent {
    pub fn mode(&self) -> Mode {
        match self {
            AppContent::Single { .. } => Mode::Single,
            AppContent::Multi { .. } => Mode::Multi,
        }
    }

    pub fn content_hash(&self) -> String {
        version::content_hash(self)
    }
}

/// App はドキュメントストア上の正本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub app_id: AppId,
    pub owner_id: OwnerId,
    pub name: String,
    pub mode: Mode,
    pub framework: Option<Framework>,

    /// Last content handed to the reconciler.
    pub deployed: AppContent,

    /// Unpublished working copy. `None` whenever it would equal `deployed`.
    pub draft: Option<AppContent>,

    pub env_vars: BTreeMap<String, String>,
    pub database_id: Option<DatabaseId>,

    pub status: AppStatus,
    pub deploy_stage: Option<Phase>,
    pub deployment_url: Option<String>,
    pub version_history: VersionHistory,

    pub last_error: Option<String>,
    pub last_deploy_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        app_id: AppId,
        owner_id: OwnerId,
        name: String,
        content: AppContent,
        framework: Option<Framework>,
        env_vars: BTreeMap<String, String>,
        database_id: Option<DatabaseId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            app_id,
            owner_id,
            name,
            mode: content.mode(),
            framework,
            deployed: content,
            draft: None,
            env_vars,
            database_id,
            status: AppStatus::Deploying,
            deploy_stage: Some(Phase::Pending),
            deployment_url: None,
            version_history: VersionHistory::new(),
            last_error: None,
            last_deploy_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn content_hash(&self) -> String {
        self.deployed.content_hash()
    }

    fn transition(&mut self, next: AppStatus, now: DateTime<Utc>) -> Result<(), PlatformError> {
        if !self.status.can_transition_to(next) {
            return Err(PlatformError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Enter `deploying` ahead of a reconcile. An app left in `deploying` by an
    /// interrupted pipeline may be redeployed as is.
    pub fn begin_deploy(&mut self, now: DateTime<Utc>) -> Result<(), PlatformError> {
        if self.status == AppStatus::Deploying {
            self.updated_at = now;
        } else {
            self.transition(AppStatus::Deploying, now)?;
        }
        self.deploy_stage = Some(Phase::Pending);
        Ok(())
    }

    /// Replace the deployed content, snapshotting what was live first.
    ///
    /// Returns `true` when the content actually changed. Only a change of
    /// content hash adds a history entry; an entrypoint switch over the same
    /// files is applied without one.
    pub fn replace_deployed(&mut self, content: AppContent, history_limit: usize, now: DateTime<Utc>) -> bool {
        if content == self.deployed {
            return false;
        }
        if content.content_hash() != self.content_hash() {
            let entry = version::snapshot(self);
            self.version_history.push(entry, history_limit);
        }
        self.deployed = content;
        self.updated_at = now;
        true
    }

    pub fn mark_running(&mut self, deployment_url: String, now: DateTime<Utc>) -> Result<(), PlatformError> {
        self.transition(AppStatus::Running, now)?;
        self.deploy_stage = None;
        self.last_error = None;
        self.last_deploy_at = Some(now);
        self.deployment_url = Some(deployment_url);
        self.normalize_draft();
        Ok(())
    }

    pub fn mark_error(&mut self, message: String, now: DateTime<Utc>) -> Result<(), PlatformError> {
        self.transition(AppStatus::Error, now)?;
        self.deploy_stage = Some(Phase::Error);
        self.last_error = Some(message);
        Ok(())
    }

    pub fn mark_deleted(&mut self, now: DateTime<Utc>) -> Result<(), PlatformError> {
        self.transition(AppStatus::Deleted, now)?;
        self.deploy_stage = None;
        Ok(())
    }

    /// Store a draft, or clear it when it matches what is deployed.
    pub fn set_draft(&mut self, content: AppContent, now: DateTime<Utc>) {
        self.draft = Some(content);
        self.updated_at = now;
        self.normalize_draft();
    }

    pub fn clear_draft(&mut self, now: DateTime<Utc>) {
        self.draft = None;
        self.updated_at = now;
    }

    fn normalize_draft(&mut self) {
        if let Some(draft) = &self.draft
            && draft.content_hash() == self.content_hash()
        {
            self.draft = None;
        }
    }

    pub fn ensure_not_deleted(&self) -> Result<(), PlatformError> {
        if self.status.is_terminal() {
            return Err(PlatformError::AppDeleted(self.app_id.clone()));
        }
        Ok(())
    }
}
