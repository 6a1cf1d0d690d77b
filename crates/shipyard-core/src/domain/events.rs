//! Events - クラスタから読み戻す生のシグナルと、それを要約したフェーズ語彙

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSeverity {
    Normal,
    Warning,
}

/// One cluster event concerning an app's objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEvent {
    /// Name of the object the event is about (e.g. a pod name).
    pub object_name: String,
    pub severity: EventSeverity,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ClusterEvent {
    pub fn normal(object_name: impl Into<String>, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            object_name: object_name.into(),
            severity: EventSeverity::Normal,
            reason: reason.into(),
            message: String::new(),
            timestamp: at,
        }
    }

    pub fn warning(object_name: impl Into<String>, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            severity: EventSeverity::Warning,
            ..Self::normal(object_name, reason, at)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Coarse, user-facing deployment progress label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Scheduled,
    Pulling,
    Pulled,
    Creating,
    Starting,
    Running,
    NotReady,
    Error,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Scheduled => "scheduled",
            Phase::Pulling => "pulling",
            Phase::Pulled => "pulled",
            Phase::Creating => "creating",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::NotReady => "not_ready",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub name: String,
    pub ready: bool,
    pub restart_count: u32,
}

/// Pod state as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub name: String,
    /// Raw pod phase string (`Pending`, `Running`, `Succeeded`, `Failed`, `Unknown`).
    pub phase: String,
    #[serde(default)]
    pub containers: Vec<ContainerState>,
}
