//! ConnectionStringProvider port - テナント DB 接続文字列の解決
//!
//! 暗号化・ローテーションなどは外部の資格情報サービスの責務です。
//! ここで受け取る値は不透明な文字列としてそのまま環境変数に渡します。

use async_trait::async_trait;

use crate::domain::{DatabaseId, OwnerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The database id is not one of the tenant's databases.
    #[error("database {database} is not available to tenant {owner}")]
    UnknownDatabase { owner: String, database: String },

    #[error("credential provider failed: {0}")]
    Backend(String),
}

/// ConnectionStringProvider は `(tenant, database_id)` から接続文字列を返す
///
/// `database_id` が `None` の場合はテナントの既定 DB を返します。
#[async_trait]
pub trait ConnectionStringProvider: Send + Sync {
    async fn resolve(&self, owner_id: &OwnerId, database_id: Option<&DatabaseId>) -> Result<String, CredentialError>;
}
