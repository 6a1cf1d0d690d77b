//! Reconcile - 望ましいリソース集合の組み立てと適用
//!
//! このコアでクラスタと話すのはこのモジュールだけです。

pub mod builder;
pub mod reconciler;

pub use builder::{ResourceBuilder, check_env_vars, deployment_url};
pub use reconciler::{ApplyError, ApplyOutcome, DeleteOutcome, DeleteReport, apply_all, delete_all, reconcile};
