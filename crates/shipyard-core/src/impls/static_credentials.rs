//! StaticConnectionStrings - 固定テーブルによる接続文字列プロバイダ

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{DatabaseId, OwnerId};
use crate::ports::{ConnectionStringProvider, CredentialError};

/// テナントごとの既定 DB と、名前付き DB の接続文字列を保持
#[derive(Debug, Clone, Default)]
pub struct StaticConnectionStrings {
    defaults: HashMap<String, String>,
    named: HashMap<(String, String), String>,
}

impl StaticConnectionStrings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, owner: &OwnerId, url: impl Into<String>) -> Self {
        self.defaults.insert(owner.as_str().to_string(), url.into());
        self
    }

    pub fn with_database(mut self, owner: &OwnerId, database: &DatabaseId, url: impl Into<String>) -> Self {
        self.named
            .insert((owner.as_str().to_string(), database.as_str().to_string()), url.into());
        self
    }
}

#[async_trait]
impl ConnectionStringProvider for StaticConnectionStrings {
    async fn resolve(&self, owner_id: &OwnerId, database_id: Option<&DatabaseId>) -> Result<String, CredentialError> {
        let found = match database_id {
            Some(db) => self
                .named
                .get(&(owner_id.as_str().to_string(), db.as_str().to_string())),
            None => self.defaults.get(owner_id.as_str()),
        };
        found.cloned().ok_or_else(|| CredentialError::UnknownDatabase {
            owner: owner_id.to_string(),
            database: database_id.map_or_else(|| "default".to_string(), |db| db.to_string()),
        })
    }
}
