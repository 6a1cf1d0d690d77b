//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてライフサイクルの各操作を実装します。
//!
//! # 主要コンポーネント
//! - **LifecycleBuilder**: Lifecycle の構築とワイヤリング
//! - **Lifecycle**: create / update / rollback / delete、下書き、clone、履歴
//! - **Status**: get_status / get_events（読み取り側）
//! - **translate**: クラスタエラーのユーザー向け翻訳

pub mod builder;
pub mod lifecycle;
pub mod status;
pub mod translate;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, LifecycleBuilder};
pub use self::lifecycle::Lifecycle;
pub use self::status::{EventsReport, StatusReport};
pub use self::translate::translate;
