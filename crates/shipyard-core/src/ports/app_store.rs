//! AppStore port - App ドキュメントの永続化
//!
//! App ドキュメントの正本（source of truth）は外部のドキュメントストアが
//! 持ちます。このコアは取得・挿入・保存・所有者別一覧だけを使います。
//!
//! # 実装
//! - **InMemoryAppStore**: テスト・ローカルシミュレーション用

use async_trait::async_trait;

use crate::domain::{App, AppId, OwnerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("app {0} already exists")]
    Duplicate(AppId),

    #[error("app {0} not found")]
    NotFound(AppId),

    #[error("store backend failed: {0}")]
    Backend(String),
}

/// AppStore は App ドキュメントを保存
///
/// # 設計原則
/// - `insert` は新規 ID のみ（既存 ID は Duplicate）
/// - `save` は既存ドキュメントの全置換
/// - 削除済み App も監査用に残す（物理削除はしない）
#[async_trait]
pub trait AppStore: Send + Sync {
    async fn get(&self, app_id: &AppId) -> Result<Option<App>, StoreError>;

    async fn insert(&self, app: &App) -> Result<(), StoreError>;

    async fn save(&self, app: &App) -> Result<(), StoreError>;

    /// 作成日時の昇順
    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<App>, StoreError>;
}
