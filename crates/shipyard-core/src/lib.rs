//! shipyard-core
//!
//! テナントが提出した Python ソースを検証し、クラスタ上の常駐 Web アプリとして
//! 配備・更新・ロールバック・削除するための中核ライブラリです。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, app, spec, state, version, events, resources, errors）
//! - **validator**: クラスタに触れる前の静的解析ゲート（syntax, imports, security, multi）
//! - **reconcile**: 望ましいリソース集合の構築と create-or-patch 適用
//! - **status**: クラスタイベント / Pod 状態からのフェーズ導出
//! - **ports**: 抽象化レイヤー（ClusterClient, AppStore, ConnectionStringProvider, など）
//! - **app**: アプリケーションロジック（builder, lifecycle, status, translate）
//! - **impls**: 実装（InMemoryCluster など開発・テスト用）
//! - **config**: 階層化された設定の読み込みと検証

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod reconcile;
pub mod status;
pub mod validator;
