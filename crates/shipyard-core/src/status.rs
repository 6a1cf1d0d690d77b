//! Status Deriver - 生のクラスタイベントから粗いフェーズへ
//!
//! # 判定規則
//! 1. warning イベント、またはエラー理由を含むイベントが一つでもあれば `error`
//!    （同じバッチに進捗イベントがあっても error が優先）
//! 2. それ以外は固定の優先順で最初に見つかった進捗理由:
//!    `Started` → `Created` → `Pulled` → `Pulling` → `Scheduled`
//! 3. どれもなければ `pending`
//!
//! 優先順は「最も進んだ段階」を採る設計判断です。再起動を繰り返す Pod で
//! 古い `Started` と新しい `Pulling` が同時に届いた場合も `starting` になります。

use serde::{Deserialize, Serialize};

use crate::domain::{ClusterEvent, EventSeverity, Phase, PodSnapshot};

/// Reasons that mark a deployment as failed regardless of severity.
pub const ERROR_REASONS: &[&str] = &[
    "Failed",
    "BackOff",
    "CrashLoopBackOff",
    "ErrImagePull",
    "ImagePullBackOff",
    "FailedScheduling",
    "FailedMount",
    "FailedCreatePodSandBox",
    "Unhealthy",
];

const PROGRESS: &[(&str, Phase)] = &[
    ("Started", Phase::Starting),
    ("Created", Phase::Creating),
    ("Pulled", Phase::Pulled),
    ("Pulling", Phase::Pulling),
    ("Scheduled", Phase::Scheduled),
];

fn is_error(event: &ClusterEvent) -> bool {
    event.severity == EventSeverity::Warning || ERROR_REASONS.contains(&event.reason.as_str())
}

/// イベント列（新しい順）からフェーズを導出
pub fn derive_phase(events: &[ClusterEvent]) -> Phase {
    if events.iter().any(is_error) {
        return Phase::Error;
    }
    PROGRESS
        .iter()
        .find(|(reason, _)| events.iter().any(|e| e.reason == *reason))
        .map_or(Phase::Pending, |(_, phase)| *phase)
}

/// First error event in the batch, for surfacing a message.
pub fn first_error(events: &[ClusterEvent]) -> Option<&ClusterEvent> {
    events.iter().find(|e| is_error(e))
}

/// Pod 単位の状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodReadiness {
    pub phase: Phase,
    pub ready: bool,
    pub restart_count: u32,
}

/// Pod のフェーズ文字列とコンテナ状態からの読み取り
///
/// `Running` でも未 ready のコンテナが一つでもあれば `not_ready` に落とします。
pub fn pod_readiness(pod: &PodSnapshot) -> PodReadiness {
    let all_ready = !pod.containers.is_empty() && pod.containers.iter().all(|c| c.ready);
    let restart_count = pod.containers.iter().map(|c| c.restart_count).sum();
    let phase = match pod.phase.as_str() {
        "Running" if all_ready => Phase::Running,
        "Running" => Phase::NotReady,
        "Pending" => Phase::Pending,
        "Failed" => Phase::Error,
        _ => Phase::Pending,
    };
    PodReadiness {
        phase,
        ready: phase == Phase::Running,
        restart_count,
    }
}
