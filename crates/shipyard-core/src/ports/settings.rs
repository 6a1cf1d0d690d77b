//! AllowListSource port - import allow-list の上書き元
//!
//! プラットフォーム全体の設定サービスが allow-list を上書きできます。
//! 上書きがなければ組み込みの一覧を使います。

use async_trait::async_trait;

/// AllowListSource は import allow-list の上書きを返す
///
/// `None` は「上書きなし」（組み込みの既定値を使う）を意味します。
#[async_trait]
pub trait AllowListSource: Send + Sync {
    async fn allowed_imports(&self) -> Option<Vec<String>>;
}
