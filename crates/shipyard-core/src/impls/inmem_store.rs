//! InMemoryAppStore - テスト用の App ドキュメントストア

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{App, AppId, OwnerId};
use crate::ports::{AppStore, StoreError};

/// InMemoryAppStore は App を app_id で保持
///
/// 書き込み回数を数えるので、「ドキュメントが一度も永続化されなかった」
/// ことをテストで検証できます。
#[derive(Default)]
pub struct InMemoryAppStore {
    apps: Mutex<HashMap<AppId, App>>,
    writes: Mutex<usize>,
}

impl InMemoryAppStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.apps.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.apps.lock().await.is_empty()
    }

    /// insert と save の合計回数
    pub async fn write_count(&self) -> usize {
        *self.writes.lock().await
    }
}

#[async_trait]
impl AppStore for InMemoryAppStore {
    async fn get(&self, app_id: &AppId) -> Result<Option<App>, StoreError> {
        Ok(self.apps.lock().await.get(app_id).cloned())
    }

    async fn insert(&self, app: &App) -> Result<(), StoreError> {
        let mut apps = self.apps.lock().await;
        if apps.contains_key(&app.app_id) {
            return Err(StoreError::Duplicate(app.app_id.clone()));
        }
        apps.insert(app.app_id.clone(), app.clone());
        *self.writes.lock().await += 1;
        Ok(())
    }

    async fn save(&self, app: &App) -> Result<(), StoreError> {
        let mut apps = self.apps.lock().await;
        match apps.get_mut(&app.app_id) {
            Some(existing) => {
                *existing = app.clone();
                *self.writes.lock().await += 1;
                Ok(())
            }
            None => Err(StoreError::NotFound(app.app_id.clone())),
        }
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<App>, StoreError> {
        let apps = self.apps.lock().await;
        let mut owned: Vec<App> = apps.values().filter(|a| &a.owner_id == owner_id).cloned().collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.app_id.cmp(&b.app_id)));
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AppContent;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn app(id: &str, owner: &str) -> App {
        App::new(
            AppId::parse(id).unwrap(),
            OwnerId::new(owner),
            id.to_string(),
            AppContent::Single { code: "x".into() },
            None,
            BTreeMap::new(),
            None,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_insert_get_save() {
        let store = InMemoryAppStore::new();
        let mut a = app("a1", "t1");
        store.insert(&a).await.unwrap();
        assert!(matches!(store.insert(&a).await, Err(StoreError::Duplicate(_))));

        a.name = "renamed".into();
        store.save(&a).await.unwrap();
        assert_eq!(store.get(&a.app_id).await.unwrap().unwrap().name, "renamed");
        assert_eq!(store.write_count().await, 2);
    }

    #[tokio::test]
    async fn test_save_unknown_is_not_found() {
        let store = InMemoryAppStore::new();
        assert!(matches!(store.save(&app("a1", "t1")).await, Err(StoreError::NotFound(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_by_owner() {
        let store = InMemoryAppStore::new();
        store.insert(&app("a1", "t1")).await.unwrap();
        store.insert(&app("a2", "t2")).await.unwrap();
        store.insert(&app("a3", "t1")).await.unwrap();
        let ids: Vec<String> = store
            .list_by_owner(&OwnerId::new("t1"))
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.app_id.to_string())
            .collect();
        assert_eq!(ids, vec!["a1", "a3"]);
    }
}
