//! ClusterClient port - クラスタリソース API の抽象化
//!
//! このコアがクラスタと話すのは、ここで定義する create / patch / delete /
//! list だけです。「作成して conflict なら patch」という収束プロトコルは
//! reconciler 側に一箇所だけ実装されています。
//!
//! # 実装
//! - **InMemoryCluster**: テスト・ローカルシミュレーション用

use async_trait::async_trait;

use crate::domain::{ClusterEvent, LabelSelector, PodSnapshot, Resource, ResourceKind};

/// ClusterError はクラスタ API の失敗を分類
///
/// # 分類
/// - `Conflict`: create 時に同名オブジェクトが既に存在（patch にフォールスルー）
/// - `NotFound`: patch / delete 対象が存在しない（delete では「削除済み」扱い）
/// - それ以外はそのまま呼び出し側へ伝播
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    #[error("{kind} \"{name}\" already exists")]
    Conflict { kind: ResourceKind, name: String },

    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("cluster API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// ClusterClient は 4 種類のリソースの create / patch / delete と、
/// イベント・Pod の一覧取得を提供
///
/// # 設計原則
/// - namespace は各リソースの metadata が持つ
/// - イベントは object 名の部分一致（app_id を含む名前）で絞り込む
/// - Pod はラベルセレクタで絞り込む
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// 疎通確認。構築時に一度だけ呼ばれる
    async fn ping(&self) -> Result<(), ClusterError>;

    async fn create(&self, resource: &Resource) -> Result<(), ClusterError>;

    async fn patch(&self, resource: &Resource) -> Result<(), ClusterError>;

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), ClusterError>;

    /// Events whose involved object name contains `name_contains`, newest first.
    async fn list_events(&self, namespace: &str, name_contains: &str) -> Result<Vec<ClusterEvent>, ClusterError>;

    async fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<PodSnapshot>, ClusterError>;
}
