//! State - app のライフサイクル状態
//!
//! # 遷移
//! - deploying → running | error (reconcile result)
//! - running | error → deploying (redeploying update / rollback)
//! - running | error | deploying → deleted (terminal)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse status of an App.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    Deploying,
    Running,
    Error,
    Deleted,
}

impl AppStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AppStatus::Deleted)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: AppStatus) -> bool {
        use AppStatus::*;
        match (self, next) {
            (Deleted, _) => false,
            (_, Deleted) => true,
            (Deploying, Running) | (Deploying, Error) => true,
            (Running, Deploying) | (Error, Deploying) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppStatus::Deploying => "deploying",
            AppStatus::Running => "running",
            AppStatus::Error => "error",
            AppStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::deploy_ok(AppStatus::Deploying, AppStatus::Running, true)]
    #[case::deploy_fail(AppStatus::Deploying, AppStatus::Error, true)]
    #[case::redeploy(AppStatus::Running, AppStatus::Deploying, true)]
    #[case::retry(AppStatus::Error, AppStatus::Deploying, true)]
    #[case::delete(AppStatus::Running, AppStatus::Deleted, true)]
    #[case::skip_deploying(AppStatus::Running, AppStatus::Error, false)]
    #[case::resurrect(AppStatus::Deleted, AppStatus::Deploying, false)]
    fn transitions(#[case] from: AppStatus, #[case] to: AppStatus, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn serializes_snake_case() {
        let s = serde_json::to_string(&AppStatus::Deploying).unwrap();
        assert_eq!(s, "\"deploying\"");
    }
}
