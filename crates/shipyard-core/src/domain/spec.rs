//! ライフサイクル操作の入力（create / update / draft）

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::app::{AppContent, Framework, Mode};
use super::errors::PlatformError;
use super::ids::{DatabaseId, OwnerId};

/// A create request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSpec {
    pub owner_id: OwnerId,

    #[serde(default)]
    pub name: Option<String>,

    /// Single-file source. Mutually exclusive with `files`.
    #[serde(default)]
    pub code: Option<String>,

    /// Multi-file source. Requires `entrypoint`.
    #[serde(default)]
    pub files: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub entrypoint: Option<String>,

    #[serde(default)]
    pub framework: Option<Framework>,

    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,

    #[serde(default)]
    pub database_id: Option<DatabaseId>,
}

impl AppSpec {
    /// Convenience constructor for a single-file app.
    pub fn single(owner_id: OwnerId, code: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: None,
            code: Some(code.into()),
            files: None,
            entrypoint: None,
            framework: None,
            env_vars: BTreeMap::new(),
            database_id: None,
        }
    }

    /// Convenience constructor for a multi-file app.
    pub fn multi(
        owner_id: OwnerId,
        files: BTreeMap<String, String>,
        entrypoint: impl Into<String>,
        framework: Framework,
    ) -> Self {
        Self {
            owner_id,
            name: None,
            code: None,
            files: Some(files),
            entrypoint: Some(entrypoint.into()),
            framework: Some(framework),
            env_vars: BTreeMap::new(),
            database_id: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_database(mut self, database_id: DatabaseId) -> Self {
        self.database_id = Some(database_id);
        self
    }

    /// Resolve the submitted fields into exactly one content shape.
    pub fn content(&self) -> Result<AppContent, PlatformError> {
        content_from_parts(self.code.clone(), self.files.clone(), self.entrypoint.clone())
    }
}

fn content_from_parts(
    code: Option<String>,
    files: Option<BTreeMap<String, String>>,
    entrypoint: Option<String>,
) -> Result<AppContent, PlatformError> {
    match (code, files) {
        (Some(_), Some(_)) => Err(PlatformError::InvalidRequest(
            "provide either code or files, not both".to_string(),
        )),
        (None, None) => Err(PlatformError::InvalidRequest(
            "code or files is required".to_string(),
        )),
        (Some(code), None) => Ok(AppContent::Single { code }),
        (None, Some(files)) => {
            let entrypoint = entrypoint.ok_or_else(|| {
                PlatformError::InvalidRequest("entrypoint is required for multi-file apps".to_string())
            })?;
            Ok(AppContent::Multi { files, entrypoint })
        }
    }
}

/// update リクエスト（`None` は「変更しない」）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub files: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub env_vars: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub database_id: Option<DatabaseId>,
}

impl AppChanges {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn files(files: BTreeMap<String, String>) -> Self {
        Self {
            files: Some(files),
            ..Self::default()
        }
    }

    pub fn env_vars(env_vars: BTreeMap<String, String>) -> Self {
        Self {
            env_vars: Some(env_vars),
            ..Self::default()
        }
    }

    /// The new content implied by these changes, given the app's current
    /// content. Returns `Ok(None)` when no content field was supplied.
    pub fn content_for(&self, current: &AppContent) -> Result<Option<AppContent>, PlatformError> {
        match (current, &self.code, &self.files) {
            (_, Some(_), Some(_)) => Err(PlatformError::InvalidRequest(
                "provide either code or files, not both".to_string(),
            )),
            (AppContent::Single { .. }, _, Some(_)) => Err(PlatformError::InvalidRequest(
                "files cannot be set on a single-file app".to_string(),
            )),
            (AppContent::Multi { .. }, Some(_), _) => Err(PlatformError::InvalidRequest(
                "code cannot be set on a multi-file app".to_string(),
            )),
            (AppContent::Single { .. }, Some(code), None) => {
                Ok(Some(AppContent::Single { code: code.clone() }))
            }
            (AppContent::Multi { files: old, entrypoint }, None, files) => {
                if files.is_none() && self.entrypoint.is_none() {
                    return Ok(None);
                }
                Ok(Some(AppContent::Multi {
                    files: files.clone().unwrap_or_else(|| old.clone()),
                    entrypoint: self.entrypoint.clone().unwrap_or_else(|| entrypoint.clone()),
                }))
            }
            (AppContent::Single { .. }, None, None) => {
                if self.entrypoint.is_some() {
                    return Err(PlatformError::InvalidRequest(
                        "entrypoint cannot be set on a single-file app".to_string(),
                    ));
                }
                Ok(None)
            }
        }
    }
}

/// Draft submission: content only, in the app's existing mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DraftContent {
    Code { code: String },
    Files { files: BTreeMap<String, String> },
}

impl DraftContent {
    /// Shape the draft after the app's content, keeping its entrypoint.
    pub fn into_content(self, current: &AppContent) -> Result<AppContent, PlatformError> {
        match (self, current) {
            (DraftContent::Code { code }, AppContent::Single { .. }) => Ok(AppContent::Single { code }),
            (DraftContent::Files { files }, AppContent::Multi { entrypoint, .. }) => Ok(AppContent::Multi {
                files,
                entrypoint: entrypoint.clone(),
            }),
            (_, current) => Err(PlatformError::InvalidRequest(format!(
                "draft shape does not match {} mode",
                match current.mode() {
                    Mode::Single => "single-file",
                    Mode::Multi => "multi-file",
                }
            ))),
        }
    }
}
