//! StaticAllowList - 固定の allow-list 上書き元

use async_trait::async_trait;

use crate::ports::AllowListSource;

/// `None` なら上書きなし（組み込みの既定値）
#[derive(Debug, Clone, Default)]
pub struct StaticAllowList(Option<Vec<String>>);

impl StaticAllowList {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn replace_with<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Some(packages.into_iter().map(Into::into).collect()))
    }
}

#[async_trait]
impl AllowListSource for StaticAllowList {
    async fn allowed_imports(&self) -> Option<Vec<String>> {
        self.0.clone()
    }
}
