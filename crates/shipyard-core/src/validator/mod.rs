//! Validator - 提出されたソースの静的解析ゲート
//!
//! クラスタに触れる前の唯一の関門です。ここを通らなかったコンテンツは
//! 永続化もされず、クラスタ呼び出しも一切発生しません。
//!
//! # チェック順序
//! 1. **syntax**: 構文木へのパース（失敗時は行番号付き）
//! 2. **app 存在**: entrypoint のみ、トップレベルの app 構築代入を探す
//! 3. **imports**: allow-list ∪ ローカルモジュール（fail-fast）
//! 4. **process**: `os` / `subprocess` 経由のコマンド実行（AST、別名も解決）
//! 5. **security**: 禁止構文（名前境界マッチ、二段目）
//!
//! # 学習ポイント
//! - 純粋関数のみ（I/O なし、共有状態なし）
//! - 同じ入力には常に同じ判定

pub mod imports;
pub mod multi;
pub mod process;
pub mod security;
pub mod syntax;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;
use crate::domain::{AppContent, ValidationFailure};

pub use imports::{AllowedImports, DEFAULT_ALLOWED_IMPORTS};
pub use multi::{local_modules, validate_files};
pub use syntax::MISSING_APP_MESSAGE;

/// Single-file apps are stored under this name.
pub const SINGLE_FILE_NAME: &str = "main.py";

/// 1 ファイル分の検証
///
/// `is_entrypoint` が false のファイル（multi-file の補助ファイル）は
/// app 存在チェックをスキップします。
pub fn validate_source(
    source: &str,
    source_path: &str,
    is_entrypoint: bool,
    local_modules: &BTreeSet<String>,
    allowed: &AllowedImports,
) -> Result<(), ValidationFailure> {
    let suite = syntax::parse(source, source_path)?;
    if is_entrypoint {
        syntax::check_app_presence(&suite)?;
    }
    imports::check_imports(source, &suite, allowed, local_modules)?;
    process::check_process_access(source, &suite)?;
    security::check_forbidden(source)
}

/// Single-file app: the whole source is the entrypoint.
pub fn validate_code(code: &str, allowed: &AllowedImports) -> Result<(), ValidationFailure> {
    validate_source(code, SINGLE_FILE_NAME, true, &BTreeSet::new(), allowed)
}

/// どちらの形のコンテンツでも検証
pub fn validate_content(
    content: &AppContent,
    allowed: &AllowedImports,
    limits: &LimitsConfig,
) -> Result<(), ValidationFailure> {
    match content {
        AppContent::Single { code } => validate_code(code, allowed),
        AppContent::Multi { files, entrypoint } => validate_files(files, entrypoint, allowed, limits),
    }
}

/// 呼び出し側へ返す検証結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ValidationResult {
    pub fn passed() -> Self {
        Self {
            ok: true,
            message: None,
            line: None,
            file: None,
        }
    }
}

impl From<Result<(), ValidationFailure>> for ValidationResult {
    fn from(result: Result<(), ValidationFailure>) -> Self {
        match result {
            Ok(()) => Self::passed(),
            Err(failure) => Self {
                ok: false,
                message: Some(failure.message),
                line: failure.line,
                file: failure.file,
            },
        }
    }
}

/// Entry for callers holding raw request fields instead of an [`AppContent`].
pub fn validate(
    code: Option<&str>,
    files: Option<(&BTreeMap<String, String>, &str)>,
    allowed: &AllowedImports,
    limits: &LimitsConfig,
) -> ValidationResult {
    let result = match (code, files) {
        (Some(code), None) => validate_code(code, allowed),
        (None, Some((files, entrypoint))) => validate_files(files, entrypoint, allowed, limits),
        (Some(_), Some(_)) => Err(ValidationFailure::new("Provide either code or files, not both")),
        (None, None) => Err(ValidationFailure::new("Either code or files is required")),
    };
    result.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const GOOD: &str = "from fastapi import FastAPI\n\napp = FastAPI()\n\n@app.get('/')\ndef root():\n    return {'ok': True}\n";

    #[test]
    fn accepts_minimal_app() {
        assert!(validate_code(GOOD, &AllowedImports::default()).is_ok());
    }

    #[test]
    fn missing_app_fails_before_imports() {
        let err = validate_code("import socket\nx = 1\n", &AllowedImports::default()).unwrap_err();
        assert_eq!(err.message, MISSING_APP_MESSAGE);
    }

    #[test]
    fn syntax_is_checked_first() {
        let err = validate_code("app = FastAPI(\n", &AllowedImports::default()).unwrap_err();
        assert!(err.message.starts_with("Syntax error"));
    }

    #[test]
    fn process_spawn_rejected_even_when_allow_listed() {
        let allowed = AllowedImports::new(["fastapi", "os", "subprocess"]);
        let spawn = format!("{GOOD}import subprocess\nsubprocess.run(['ls'])\n");
        let err = validate_code(&spawn, &allowed).unwrap_err();
        assert!(err.message.contains("subprocess"));

        let shell = format!("{GOOD}import os\nos.system('rm -rf /')\n");
        let err = validate_code(&shell, &allowed).unwrap_err();
        assert!(err.message.contains("os.system"));
    }

    #[rstest]
    #[case::module_alias("import os as o\no.system('rm -rf /')\n")]
    #[case::star_import("from os import *\nsystem('id')\n")]
    #[case::stored_reference("import os\nrun = os.system\nrun('id')\n")]
    #[case::getattr("import os\ngetattr(os, 'system')('id')\n")]
    fn indirect_os_command_is_rejected_with_default_allow_list(#[case] tail: &str) {
        let src = format!("{GOOD}{tail}");
        let err = validate_code(&src, &AllowedImports::default()).unwrap_err();
        assert!(err.message.starts_with("Forbidden construct"), "{tail:?}: {}", err.message);
        assert!(err.message.contains("OS command execution"));
    }

    #[test]
    fn import_gate_runs_before_security_gate() {
        let src = format!("{GOOD}import socket\neval('1')\n");
        let err = validate_code(&src, &AllowedImports::default()).unwrap_err();
        assert_eq!(err.message, "Import 'socket' is not allowed");
    }

    #[test]
    fn validation_is_deterministic() {
        let src = format!("{GOOD}open('x')\n");
        let a = validate_code(&src, &AllowedImports::default());
        let b = validate_code(&src, &AllowedImports::default());
        assert_eq!(a, b);
    }

    #[test]
    fn result_conversion_carries_location() {
        let failure = ValidationFailure::new("bad").at_line(4).in_file("a.py");
        let result = ValidationResult::from(Err(failure));
        assert!(!result.ok);
        assert_eq!(result.line, Some(4));
        assert_eq!(result.file.as_deref(), Some("a.py"));
        assert!(ValidationResult::from(Ok(())).ok);
    }

    #[test]
    fn raw_entry_requires_one_shape() {
        let limits = LimitsConfig::default();
        let allowed = AllowedImports::default();
        assert!(!validate(None, None, &allowed, &limits).ok);
        assert!(validate(Some(GOOD), None, &allowed, &limits).ok);
    }
}
