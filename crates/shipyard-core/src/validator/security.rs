//! Forbidden-construct gate.
//!
//! Second layer behind the AST pass in `process`: name-boundary matching
//! over the raw source. A call only matches when the
//! name is not preceded by an identifier character or a dot, so `reopen(`,
//! `my_eval(` and `re.compile(` pass while `open(` and `eval (` do not.

use std::sync::LazyLock;

use regex::Regex;

use super::syntax::line_of;
use crate::domain::ValidationFailure;

struct ForbiddenPattern {
    regex: Regex,
    label: &'static str,
}

/// Bare builtins that must not be called directly.
const FORBIDDEN_BUILTINS: &[(&str, &str)] = &[
    ("eval", "dynamic evaluation"),
    ("exec", "dynamic execution"),
    ("compile", "dynamic compilation"),
    ("open", "direct file access"),
    ("__import__", "dynamic import"),
    ("input", "raw line input"),
];

static PATTERNS: LazyLock<Vec<ForbiddenPattern>> = LazyLock::new(|| {
    let mut patterns: Vec<ForbiddenPattern> = FORBIDDEN_BUILTINS
        .iter()
        .map(|(name, label)| ForbiddenPattern {
            regex: Regex::new(&format!(r"(?m)(?:^|[^\w.])(?P<call>{name})\s*\(")).expect("builtin pattern compiles"),
            label,
        })
        .collect();

    let process = [
        (
            r"(?m)(?:^|[^\w.])(?P<call>os\s*\.\s*(?:system|popen|exec\w*|spawn\w*|fork\w*|posix_spawn\w*))\s*\(",
            "OS command execution",
        ),
        (r"(?m)(?:^|[^\w.])(?P<call>subprocess\s*\.\s*\w+)\s*\(", "process spawning"),
        (r"(?m)^[ \t]*(?P<call>from[ \t]+subprocess[ \t]+import)\b", "process spawning"),
        (
            r"(?m)^[ \t]*(?P<call>from[ \t]+os[ \t]+import)[^\n#]*\b(?:system|popen|exec\w*|spawn\w*|fork\w*)\b",
            "OS command execution",
        ),
    ];
    patterns.extend(process.into_iter().map(|(pattern, label)| ForbiddenPattern {
        regex: Regex::new(pattern).expect("process pattern compiles"),
        label,
    }));
    patterns
});

pub(crate) fn forbidden_construct(snippet: &str, label: &str) -> ValidationFailure {
    ValidationFailure::new(format!("Forbidden construct '{snippet}' ({label}) is not allowed"))
}

/// Reject the earliest forbidden construct in `source`.
pub(crate) fn check_forbidden(source: &str) -> Result<(), ValidationFailure> {
    let earliest = PATTERNS
        .iter()
        .filter_map(|p| {
            p.regex
                .captures(source)
                .and_then(|caps| caps.name("call"))
                .map(|m| (m.start(), m.as_str(), p.label))
        })
        .min_by_key(|(start, _, _)| *start);

    match earliest {
        None => Ok(()),
        Some((start, matched, label)) => {
            let snippet: String = matched.split_whitespace().collect::<Vec<_>>().join(" ");
            Err(forbidden_construct(&snippet, label).at_line(line_of(source, start)))
        }
    }
}
