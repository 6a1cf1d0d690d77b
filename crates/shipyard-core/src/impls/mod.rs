//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryCluster**: 呼び出しログと失敗注入つきのクラスタ
//! - **InMemoryAppStore**: テスト用の App ドキュメントストア
//! - **StaticConnectionStrings**: 固定テーブルの接続文字列プロバイダ
//! - **StaticAllowList**: 固定の allow-list 上書き元
//!
//! # 本番用実装
//! 実クラスタ・ドキュメントストア・資格情報サービスへのアダプタは
//! 別クレートに配置します。

pub mod inmem_cluster;
pub mod inmem_store;
pub mod static_allow_list;
pub mod static_credentials;

// 主要な型を再エクスポート
pub use self::inmem_cluster::{ClusterCall, InMemoryCluster, Operation};
pub use self::inmem_store::InMemoryAppStore;
pub use self::static_allow_list::StaticAllowList;
pub use self::static_credentials::StaticConnectionStrings;
