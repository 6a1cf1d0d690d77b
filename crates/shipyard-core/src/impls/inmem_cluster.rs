//! InMemoryCluster - テスト・ローカルシミュレーション用のクラスタ
//!
//! # 学習ポイント
//! - 実クラスタと同じ conflict / not-found の応答を返す
//! - 呼び出しログを記録して「クラスタ呼び出しが発生しなかった」ことを検証できる
//! - 失敗注入（種類ごとの一回限りのエラー、疎通不可）

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ClusterEvent, LabelSelector, PodSnapshot, Resource, ResourceKind};
use crate::ports::{ClusterClient, ClusterError};

/// 記録されるクラスタ呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    Create { kind: ResourceKind, name: String },
    Patch { kind: ResourceKind, name: String },
    Delete { kind: ResourceKind, name: String },
    ListEvents { name_contains: String },
    ListPods { selector: String },
}

impl ClusterCall {
    /// Whether the call changes cluster state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ClusterCall::Create { .. } | ClusterCall::Patch { .. } | ClusterCall::Delete { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Patch,
    Delete,
}

type ObjectKey = (String, ResourceKind, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Resource>,
    events: Vec<(String, ClusterEvent)>,
    pods: Vec<(String, BTreeMap<String, String>, PodSnapshot)>,
    calls: Vec<ClusterCall>,
    injected: HashMap<(Operation, ResourceKind), VecDeque<ClusterError>>,
    unreachable: bool,
}

impl State {
    fn take_injected(&mut self, op: Operation, kind: ResourceKind) -> Option<ClusterError> {
        self.injected.get_mut(&(op, kind)).and_then(VecDeque::pop_front)
    }
}

/// InMemoryCluster はオブジェクトを (namespace, kind, name) で保持
///
/// # 使用例
/// ```ignore
/// let cluster = Arc::new(InMemoryCluster::new());
/// cluster.fail_next(Operation::Create, ResourceKind::Workload, err).await;
/// // ... lifecycle を実行 ...
/// assert!(cluster.calls().await.is_empty());
/// ```
#[derive(Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// ping が Unavailable を返すクラスタ
    pub fn unreachable() -> Self {
        Self {
            state: Mutex::new(State {
                unreachable: true,
                ..State::default()
            }),
        }
    }

    /// 次の `op` / `kind` 呼び出しを一度だけ `error` で失敗させる
    pub async fn fail_next(&self, op: Operation, kind: ResourceKind, error: ClusterError) {
        let mut state = self.state.lock().await;
        state.injected.entry((op, kind)).or_default().push_back(error);
    }

    pub async fn push_event(&self, namespace: &str, event: ClusterEvent) {
        self.state.lock().await.events.push((namespace.to_string(), event));
    }

    pub async fn insert_pod(&self, namespace: &str, labels: BTreeMap<String, String>, pod: PodSnapshot) {
        self.state.lock().await.pods.push((namespace.to_string(), labels, pod));
    }

    pub async fn get(&self, namespace: &str, kind: ResourceKind, name: &str) -> Option<Resource> {
        let key = (namespace.to_string(), kind, name.to_string());
        self.state.lock().await.objects.get(&key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.state.lock().await.objects.len()
    }

    pub async fn calls(&self) -> Vec<ClusterCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }
}

fn key_of(resource: &Resource) -> ObjectKey {
    let meta = resource.metadata();
    (meta.namespace.clone(), resource.kind(), meta.name.clone())
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn ping(&self) -> Result<(), ClusterError> {
        if self.state.lock().await.unreachable {
            return Err(ClusterError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    async fn create(&self, resource: &Resource) -> Result<(), ClusterError> {
        let mut state = self.state.lock().await;
        let (kind, name) = (resource.kind(), resource.name().to_string());
        state.calls.push(ClusterCall::Create {
            kind,
            name: name.clone(),
        });
        if let Some(err) = state.take_injected(Operation::Create, kind) {
            return Err(err);
        }

        let key = key_of(resource);
        if state.objects.contains_key(&key) {
            return Err(ClusterError::Conflict { kind, name });
        }
        state.objects.insert(key, resource.clone());
        Ok(())
    }

    async fn patch(&self, resource: &Resource) -> Result<(), ClusterError> {
        let mut state = self.state.lock().await;
        let (kind, name) = (resource.kind(), resource.name().to_string());
        state.calls.push(ClusterCall::Patch {
            kind,
            name: name.clone(),
        });
        if let Some(err) = state.take_injected(Operation::Patch, kind) {
            return Err(err);
        }

        match state.objects.get_mut(&key_of(resource)) {
            Some(existing) => {
                *existing = resource.clone();
                Ok(())
            }
            None => Err(ClusterError::NotFound { kind, name }),
        }
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock().await;
        state.calls.push(ClusterCall::Delete {
            kind,
            name: name.to_string(),
        });
        if let Some(err) = state.take_injected(Operation::Delete, kind) {
            return Err(err);
        }

        let key = (namespace.to_string(), kind, name.to_string());
        match state.objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(ClusterError::NotFound {
                kind,
                name: name.to_string(),
            }),
        }
    }

    async fn list_events(&self, namespace: &str, name_contains: &str) -> Result<Vec<ClusterEvent>, ClusterError> {
        let mut state = self.state.lock().await;
        state.calls.push(ClusterCall::ListEvents {
            name_contains: name_contains.to_string(),
        });
        let mut events: Vec<ClusterEvent> = state
            .events
            .iter()
            .filter(|(ns, e)| ns == namespace && e.object_name.contains(name_contains))
            .map(|(_, e)| e.clone())
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(events)
    }

    async fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<PodSnapshot>, ClusterError> {
        let mut state = self.state.lock().await;
        state.calls.push(ClusterCall::ListPods {
            selector: selector.to_string(),
        });
        Ok(state
            .pods
            .iter()
            .filter(|(ns, labels, _)| ns == namespace && selector.matches(labels))
            .map(|(_, _, pod)| pod.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resources::{CodeBundle, ObjectMeta};
    use chrono::{Duration, TimeZone, Utc};

    fn bundle(name: &str, body: &str) -> Resource {
        let mut data = BTreeMap::new();
        data.insert("main.py".to_string(), body.to_string());
        Resource::CodeBundle(CodeBundle {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: "apps".to_string(),
                ..ObjectMeta::default()
            },
            data,
        })
    }

    #[tokio::test]
    async fn test_create_then_conflict() {
        let cluster = InMemoryCluster::new();
        cluster.create(&bundle("a", "1")).await.unwrap();
        let err = cluster.create(&bundle("a", "2")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(cluster.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_patch_replaces_and_requires_existing() {
        let cluster = InMemoryCluster::new();
        assert!(cluster.patch(&bundle("a", "1")).await.unwrap_err().is_not_found());

        cluster.create(&bundle("a", "1")).await.unwrap();
        cluster.patch(&bundle("a", "2")).await.unwrap();
        let stored = cluster.get("apps", ResourceKind::CodeBundle, "a").await.unwrap();
        assert_eq!(stored, bundle("a", "2"));
    }

    #[tokio::test]
    async fn test_delete_absent_is_not_found() {
        let cluster = InMemoryCluster::new();
        let err = cluster.delete(ResourceKind::Workload, "apps", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let cluster = InMemoryCluster::new();
        cluster
            .fail_next(Operation::Create, ResourceKind::CodeBundle, ClusterError::Forbidden("quota".into()))
            .await;
        assert!(matches!(cluster.create(&bundle("a", "1")).await, Err(ClusterError::Forbidden(_))));
        assert!(cluster.create(&bundle("a", "1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_ping() {
        assert!(matches!(InMemoryCluster::unreachable().ping().await, Err(ClusterError::Unavailable(_))));
        assert!(InMemoryCluster::new().ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_events_filtered_and_newest_first() {
        let cluster = InMemoryCluster::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        cluster.push_event("apps", ClusterEvent::normal("app-x-1", "Scheduled", t0)).await;
        cluster
            .push_event("apps", ClusterEvent::normal("app-x-1", "Pulling", t0 + Duration::seconds(5)))
            .await;
        cluster.push_event("apps", ClusterEvent::normal("app-y-1", "Started", t0)).await;
        cluster.push_event("other", ClusterEvent::normal("app-x-2", "Started", t0)).await;

        let events = cluster.list_events("apps", "app-x").await.unwrap();
        let reasons: Vec<&str> = events.iter().map(|e| e.reason.as_str()).collect();
        assert_eq!(reasons, vec!["Pulling", "Scheduled"]);
    }

    #[tokio::test]
    async fn test_call_log_records_mutations() {
        let cluster = InMemoryCluster::new();
        cluster.create(&bundle("a", "1")).await.unwrap();
        let _ = cluster.list_events("apps", "a").await;
        let calls = cluster.calls().await;
        assert_eq!(calls.len(), 2);
        assert!(calls[0].is_mutation());
        assert!(!calls[1].is_mutation());
    }
}
