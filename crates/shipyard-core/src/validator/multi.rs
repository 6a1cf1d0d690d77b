//! Multi-file validation - ファイル数・サイズ・ファイル名の上限チェック
//!
//! 上限チェックはすべて構文解析の前に行います。上限を超えた提出物は
//! 一行もパースされません。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use super::imports::AllowedImports;
use super::validate_source;
use crate::config::LimitsConfig;
use crate::domain::ValidationFailure;

pub const SOURCE_EXTENSION: &str = ".py";

/// フラットなファイル名のみ許可（ディレクトリ区切りなし）
static FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*\.py$").expect("filename pattern compiles"));

/// ファイル名から拡張子を除いたモジュール名の集合
pub fn local_modules(files: &BTreeMap<String, String>) -> BTreeSet<String> {
    files
        .keys()
        .filter_map(|name| name.strip_suffix(SOURCE_EXTENSION))
        .map(str::to_string)
        .collect()
}

fn check_limits(files: &BTreeMap<String, String>, limits: &LimitsConfig) -> Result<(), ValidationFailure> {
    if files.is_empty() {
        return Err(ValidationFailure::new("At least one file is required"));
    }
    if files.len() > limits.max_files {
        return Err(ValidationFailure::new(format!(
            "Too many files: {} (maximum {})",
            files.len(),
            limits.max_files
        )));
    }

    let mut total = 0usize;
    for (name, content) in files {
        if !name.ends_with(SOURCE_EXTENSION) {
            return Err(ValidationFailure::new(format!("Only {SOURCE_EXTENSION} files are allowed")).in_file(name));
        }
        if !FILENAME.is_match(name) {
            return Err(ValidationFailure::new("Invalid filename").in_file(name));
        }
        if content.len() > limits.max_file_bytes {
            return Err(ValidationFailure::new(format!(
                "File exceeds {} KB limit",
                limits.max_file_bytes / 1024
            ))
            .in_file(name));
        }
        total += content.len();
    }

    if total > limits.max_total_bytes {
        return Err(ValidationFailure::new(format!(
            "Total size exceeds {} KB limit",
            limits.max_total_bytes / 1024
        )));
    }
    Ok(())
}

/// 複数ファイルの提出物を検証
///
/// # 検証順序
/// 1. 上限（ファイル数、ファイル単位・合計サイズ、拡張子、ファイル名）
/// 2. entrypoint の存在
/// 3. entrypoint を先に、app 存在チェック込みで検証
/// 4. 残りのファイルを名前順に、構文・import・禁止構文のみ検証
pub fn validate_files(
    files: &BTreeMap<String, String>,
    entrypoint: &str,
    allowed: &AllowedImports,
    limits: &LimitsConfig,
) -> Result<(), ValidationFailure> {
    check_limits(files, limits)?;

    let Some(entry_source) = files.get(entrypoint) else {
        return Err(ValidationFailure::new(format!(
            "Entrypoint '{entrypoint}' not found in files"
        )));
    };

    let locals = local_modules(files);

    validate_source(entry_source, entrypoint, true, &locals, allowed)
        .map_err(|failure| failure.in_file(entrypoint))?;

    for (name, source) in files.iter().filter(|(name, _)| name.as_str() != entrypoint) {
        validate_source(source, name, false, &locals, allowed).map_err(|failure| failure.in_file(name))?;
    }
    Ok(())
}
