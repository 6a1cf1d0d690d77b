//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部の協調者（クラスタ API、ドキュメントストア、資格情報
//! サービス、設定サービス）へのインターフェースを提供し、実装の詳細を
//! 隠蔽します。
//!
//! # 設計原則
//! - ドキュメントストアが App の正本
//! - クラスタは望ましい状態を適用する先で、差分はクライアント側で持たない
//! - 時刻と ID 生成も差し替え可能にしてテストを決定的にする

pub mod app_store;
pub mod clock;
pub mod cluster;
pub mod credentials;
pub mod id_generator;
pub mod settings;

// 主要な trait を再エクスポート
pub use self::app_store::{AppStore, StoreError};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::cluster::{ClusterClient, ClusterError};
pub use self::credentials::{ConnectionStringProvider, CredentialError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::settings::AllowListSource;
