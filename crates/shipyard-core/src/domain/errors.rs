//! Errors - ライフサイクル操作が返すエラー分類
//!
//! # 設計原則
//! - 検証失敗は行番号とファイル名付きでそのまま呼び出し元へ
//! - クラスタ由来の失敗は翻訳済みメッセージで `DeploymentFailed` に集約

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::AppId;
use super::state::AppStatus;

/// Why submitted source was rejected. Surfaced verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ValidationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            file: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{file}: ")?;
        }
        f.write_str(&self.message)?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("validation failed: {0}")]
    ValidationFailed(ValidationFailure),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid database: {0}")]
    InvalidDatabase(String),

    /// `app_id` は保存済みの app があるときだけ入る（同じ id で再試行できる）
    #[error("deployment failed: {message}")]
    DeploymentFailed { app_id: Option<AppId>, message: String },

    #[error("invalid version index {index}: history holds {max} entries")]
    InvalidVersion { index: usize, max: usize },

    #[error("app not found: {0}")]
    NotFound(AppId),

    #[error("app {0} has been deleted")]
    AppDeleted(AppId),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: AppStatus, to: AppStatus },

    #[error("store error: {0}")]
    Store(String),
}

impl PlatformError {
    pub fn deployment_failed(app_id: Option<AppId>, message: impl Into<String>) -> Self {
        PlatformError::DeploymentFailed {
            app_id,
            message: message.into(),
        }
    }

    /// 失敗した操作の対象として保存済みの app_id
    pub fn app_id(&self) -> Option<&AppId> {
        match self {
            PlatformError::DeploymentFailed { app_id, .. } => app_id.as_ref(),
            PlatformError::NotFound(app_id) | PlatformError::AppDeleted(app_id) => Some(app_id),
            _ => None,
        }
    }
}

impl From<ValidationFailure> for PlatformError {
    fn from(failure: ValidationFailure) -> Self {
        PlatformError::ValidationFailed(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display_includes_location() {
        let f = ValidationFailure::new("Import 'socket' is not allowed")
            .at_line(3)
            .in_file("util.py");
        assert_eq!(f.to_string(), "util.py: Import 'socket' is not allowed (line 3)");
    }

    #[test]
    fn invalid_version_message() {
        let e = PlatformError::InvalidVersion { index: 4, max: 2 };
        assert_eq!(e.to_string(), "invalid version index 4: history holds 2 entries");
    }

    #[test]
    fn deployment_failure_carries_app_id() {
        let app_id = AppId::parse("abc123").unwrap();
        let e = PlatformError::deployment_failed(Some(app_id.clone()), "quota exceeded");
        assert_eq!(e.to_string(), "deployment failed: quota exceeded");
        assert_eq!(e.app_id(), Some(&app_id));
        assert_eq!(PlatformError::deployment_failed(None, "x").app_id(), None);
    }
}
