//! Version - コンテンツハッシュと上限付きのバージョン履歴
//!
//! ハッシュは SHA-256 ダイジェストの先頭 16 桁（hex）。multi-file は
//! ファイル名で**ソートしてから**、名前と内容をそれぞれ長さ付きで連結して
//! ハッシュします。マップの走査順も、内容に紛れた区切り文字もダイジェストに
//! 漏れません。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::app::{App, AppContent};

const HASH_LEN: usize = 16;

/// Default number of superseded versions kept per app.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

fn short_hex(digest: impl AsRef<[u8]>) -> String {
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_LEN);
    hex
}

/// Hash of single-file source text.
pub fn hash_code(code: &str) -> String {
    short_hex(Sha256::digest(code.as_bytes()))
}

/// Hash of a multi-file map. Accepts any map type.
pub fn hash_files<'a, I>(files: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut entries: Vec<(&String, &String)> = files.into_iter().collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (name, content) in entries {
        for part in [name, content] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
    }
    short_hex(hasher.finalize())
}

pub fn content_hash(content: &AppContent) -> String {
    match content {
        AppContent::Single { code } => hash_code(code),
        AppContent::Multi { files, .. } => hash_files(files),
    }
}

/// One superseded deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub content: AppContent,
    pub deployed_at: DateTime<Utc>,
    pub content_hash: String,
}

impl VersionEntry {
    pub fn new(content: AppContent, deployed_at: DateTime<Utc>) -> Self {
        let content_hash = content_hash(&content);
        Self {
            content,
            deployed_at,
            content_hash,
        }
    }
}

/// 置き換えられた配備の履歴（新しい順）
///
/// index 0 は常に現在の配備の直前に live だったコンテンツ。
/// `push` に渡した上限を超えて伸びることはありません。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionHistory {
    entries: Vec<VersionEntry>,
}

impl VersionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `entry`, dropping the oldest entries beyond `limit`.
    pub fn push(&mut self, entry: VersionEntry, limit: usize) {
        self.entries.insert(0, entry);
        self.entries.truncate(limit);
    }

    pub fn get(&self, index: usize) -> Option<&VersionEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionEntry> {
        self.entries.iter()
    }
}

/// Capture the currently deployed content of `app` (never the draft).
pub fn snapshot(app: &App) -> VersionEntry {
    let deployed_at = app.last_deploy_at.unwrap_or(app.created_at);
    VersionEntry::new(app.deployed.clone(), deployed_at)
}

/// True iff the working copy (draft, or deployed when there is no draft)
/// differs from what is live.
pub fn has_unpublished_changes(app: &App) -> bool {
    let working = app.draft.as_ref().unwrap_or(&app.deployed);
    content_hash(working) != content_hash(&app.deployed)
}

/// Lightweight listing row for version history reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub index: usize,
    pub content_hash: String,
    pub deployed_at: DateTime<Utc>,
}

impl VersionHistory {
    pub fn summaries(&self) -> Vec<VersionSummary> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| VersionSummary {
                index,
                content_hash: entry.content_hash.clone(),
                deployed_at: entry.deployed_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::{BTreeMap, HashMap};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap()
    }

    fn single(code: &str) -> AppContent {
        AppContent::Single {
            code: code.to_string(),
        }
    }

    #[test]
    fn hash_is_fixed_length_and_deterministic() {
        let a = hash_code("print('hi')");
        let b = hash_code("print('hi')");
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_LEN);
        assert_ne!(a, hash_code("print('hi!')"));
    }

    #[test]
    fn multi_file_hash_ignores_insertion_order() {
        let mut forward = HashMap::new();
        forward.insert("main.py".to_string(), "import util".to_string());
        forward.insert("util.py".to_string(), "X = 1".to_string());
        forward.insert("db.py".to_string(), "URL = ''".to_string());

        let mut backward = HashMap::new();
        backward.insert("db.py".to_string(), "URL = ''".to_string());
        backward.insert("util.py".to_string(), "X = 1".to_string());
        backward.insert("main.py".to_string(), "import util".to_string());

        let sorted: BTreeMap<_, _> = forward.clone().into_iter().collect();

        assert_eq!(hash_files(&forward), hash_files(&backward));
        assert_eq!(hash_files(&forward), hash_files(&sorted));
    }

    #[test]
    fn multi_file_hash_depends_on_names() {
        let mut a = BTreeMap::new();
        a.insert("a.py".to_string(), "X = 1".to_string());
        let mut b = BTreeMap::new();
        b.insert("b.py".to_string(), "X = 1".to_string());
        assert_ne!(hash_files(&a), hash_files(&b));
    }

    #[test]
    fn multi_file_hash_is_not_fooled_by_embedded_separators() {
        let mut spliced = BTreeMap::new();
        spliced.insert("a.py".to_string(), "X = 1\nb.py:Y = 2".to_string());
        let mut split = BTreeMap::new();
        split.insert("a.py".to_string(), "X = 1".to_string());
        split.insert("b.py".to_string(), "Y = 2".to_string());
        assert_ne!(hash_files(&spliced), hash_files(&split));

        let mut shifted = BTreeMap::new();
        shifted.insert("a.py".to_string(), "X".to_string());
        let mut renamed = BTreeMap::new();
        renamed.insert("a.py:".to_string(), String::new());
        assert_ne!(hash_files(&shifted), hash_files(&renamed));
    }

    #[test]
    fn history_is_most_recent_first_and_bounded() {
        let mut history = VersionHistory::new();
        for i in 0..15u32 {
            history.push(VersionEntry::new(single(&format!("v{i}")), at(i)), 10);
        }
        assert_eq!(history.len(), 10);
        assert_eq!(history.get(0).unwrap().content, single("v14"));
        assert_eq!(history.get(9).unwrap().content, single("v5"));
        assert!(history.get(10).is_none());
    }

    #[test]
    fn entry_carries_hash_of_its_content() {
        let entry = VersionEntry::new(single("x = 1"), at(0));
        assert_eq!(entry.content_hash, hash_code("x = 1"));
    }

    #[test]
    fn summaries_are_indexed() {
        let mut history = VersionHistory::new();
        history.push(VersionEntry::new(single("a"), at(1)), 10);
        history.push(VersionEntry::new(single("b"), at(2)), 10);
        let rows = history.summaries();
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].content_hash, hash_code("b"));
        assert_eq!(rows[1].deployed_at, at(1));
    }
}
