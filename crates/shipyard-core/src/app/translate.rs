//! Error translation - クラスタの生エラーを短いユーザー向けの文に
//!
//! 既知の部分文字列によるベストエフォートのパターンマッチです。
//! どれにも当たらなければ原文をそのまま返します。

use std::sync::LazyLock;

use regex::Regex;

/// `"message": "..."` inside an embedded API status document.
static NESTED_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""message"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("nested message pattern compiles")
});

pub const NAMING_CONFLICT: &str =
    "Another deployment is using this app's resource names right now. Please retry in a moment.";
pub const ALREADY_EXISTS: &str = "Resources for this app already exist. Update the app instead of creating it again.";
pub const PERMISSION_DENIED: &str = "The platform is not permitted to deploy this app. Please contact support.";
pub const NOT_FOUND: &str = "A resource this app depends on was not found. Please deploy again.";

/// 生エラー文字列を翻訳
///
/// # 判定順序
/// 1. 名前の競合（conflict だが already exists ではない）
/// 2. already exists
/// 3. forbidden / permission
/// 4. not found
/// 5. 埋め込まれた `"message"` の抽出
pub fn translate(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();

    if lower.contains("conflict") && !lower.contains("already exists") {
        return NAMING_CONFLICT.to_string();
    }
    if lower.contains("already exists") {
        return ALREADY_EXISTS.to_string();
    }
    if lower.contains("forbidden") || lower.contains("permission") {
        return PERMISSION_DENIED.to_string();
    }
    if lower.contains("not found") {
        return NOT_FOUND.to_string();
    }
    if let Some(caps) = NESTED_MESSAGE.captures(raw)
        && let Some(message) = caps.get(1)
    {
        return message.as_str().replace("\\\"", "\"");
    }
    raw.to_string()
}
