//! Imports - import の allow-list
//!
//! ネストの深さに関係なく全 import 文を対象に、トップレベルのパッケージ名が
//! allow-list か同じ app の別ファイルであることを確認します。
//! 最初の違反で走査を止めます。

use std::collections::BTreeSet;

use rustpython_parser::ast;

use super::syntax::line_of;
use crate::domain::ValidationFailure;

/// Packages user code may import when no platform override is configured.
pub const DEFAULT_ALLOWED_IMPORTS: &[&str] = &[
    "__future__",
    "asyncio",
    "asyncpg",
    "base64",
    "collections",
    "dataclasses",
    "datetime",
    "decimal",
    "enum",
    "fastapi",
    "fasthtml",
    "flask",
    "functools",
    "hashlib",
    "html",
    "httpx",
    "itertools",
    "jinja2",
    "json",
    "logging",
    "markdown",
    "math",
    "os",
    "psycopg2",
    "pydantic",
    "random",
    "re",
    "requests",
    "sqlalchemy",
    "sqlmodel",
    "starlette",
    "statistics",
    "string",
    "textwrap",
    "time",
    "typing",
    "uuid",
    "zoneinfo",
];

/// The effective set of importable top-level packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedImports(BTreeSet<String>);

impl AllowedImports {
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(packages.into_iter().map(Into::into).collect())
    }

    /// Use the override when present, the built-in list otherwise.
    pub fn from_override(packages: Option<Vec<String>>) -> Self {
        match packages {
            Some(packages) => Self::new(packages),
            None => Self::default(),
        }
    }

    pub fn contains(&self, package: &str) -> bool {
        self.0.contains(package)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for AllowedImports {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_IMPORTS.iter().copied())
    }
}

fn top_level(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

struct ImportGate<'a> {
    source: &'a str,
    allowed: &'a AllowedImports,
    local_modules: &'a BTreeSet<String>,
}

impl ImportGate<'_> {
    fn permits(&self, package: &str) -> bool {
        self.allowed.contains(package) || self.local_modules.contains(package)
    }

    fn reject(&self, package: &str, offset: usize) -> ValidationFailure {
        ValidationFailure::new(format!("Import '{package}' is not allowed"))
            .at_line(line_of(self.source, offset))
    }

    fn check_import(&self, names: &[ast::Alias], offset: usize) -> Result<(), ValidationFailure> {
        for alias in names {
            let package = top_level(alias.name.as_str());
            if !self.permits(package) {
                return Err(self.reject(package, offset));
            }
        }
        Ok(())
    }

    fn check_import_from(
        &self,
        module: Option<&str>,
        names: &[ast::Alias],
        relative: bool,
        offset: usize,
    ) -> Result<(), ValidationFailure> {
        match (module, relative) {
            (Some(module), _) => {
                let package = top_level(module);
                if !self.permits(package) {
                    return Err(self.reject(package, offset));
                }
            }
            // `from . import util` names sibling modules directly.
            (None, true) => {
                for alias in names {
                    let name = alias.name.as_str();
                    if !self.local_modules.contains(name) {
                        return Err(self.reject(name, offset));
                    }
                }
            }
            (None, false) => {}
        }
        Ok(())
    }

    fn walk(&self, body: &[ast::Stmt]) -> Result<(), ValidationFailure> {
        for stmt in body {
            self.visit(stmt)?;
        }
        Ok(())
    }

    fn visit(&self, stmt: &ast::Stmt) -> Result<(), ValidationFailure> {
        match stmt {
            ast::Stmt::Import(ast::StmtImport { names, range, .. }) => {
                self.check_import(names, u32::from(range.start()) as usize)
            }
            ast::Stmt::ImportFrom(ast::StmtImportFrom {
                module,
                names,
                level,
                range,
                ..
            }) => {
                let relative = level.as_ref().is_some_and(|l| l.to_u32() > 0);
                self.check_import_from(
                    module.as_ref().map(|m| m.as_str()),
                    names,
                    relative,
                    u32::from(range.start()) as usize,
                )
            }
            ast::Stmt::FunctionDef(ast::StmtFunctionDef { body, .. })
            | ast::Stmt::AsyncFunctionDef(ast::StmtAsyncFunctionDef { body, .. })
            | ast::Stmt::ClassDef(ast::StmtClassDef { body, .. })
            | ast::Stmt::With(ast::StmtWith { body, .. })
            | ast::Stmt::AsyncWith(ast::StmtAsyncWith { body, .. }) => self.walk(body),
            ast::Stmt::If(ast::StmtIf { body, orelse, .. })
            | ast::Stmt::For(ast::StmtFor { body, orelse, .. })
            | ast::Stmt::AsyncFor(ast::StmtAsyncFor { body, orelse, .. })
            | ast::Stmt::While(ast::StmtWhile { body, orelse, .. }) => {
                self.walk(body)?;
                self.walk(orelse)
            }
            ast::Stmt::Try(ast::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            })
            | ast::Stmt::TryStar(ast::StmtTryStar {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                self.walk(body)?;
                for handler in handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    self.walk(&h.body)?;
                }
                self.walk(orelse)?;
                self.walk(finalbody)
            }
            ast::Stmt::Match(ast::StmtMatch { cases, .. }) => {
                for case in cases {
                    self.walk(&case.body)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Check every import in `suite` against `allowed ∪ local_modules`.
pub(crate) fn check_imports(
    source: &str,
    suite: &ast::Suite,
    allowed: &AllowedImports,
    local_modules: &BTreeSet<String>,
) -> Result<(), ValidationFailure> {
    ImportGate {
        source,
        allowed,
        local_modules,
    }
    .walk(suite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::syntax::parse;
    use rstest::rstest;

    fn check(src: &str, locals: &[&str]) -> Result<(), ValidationFailure> {
        let suite = parse(src, "<test>").unwrap();
        let locals: BTreeSet<String> = locals.iter().map(|s| s.to_string()).collect();
        check_imports(src, &suite, &AllowedImports::default(), &locals)
    }

    #[rstest]
    #[case::plain("import json\n")]
    #[case::dotted("import os.path\n")]
    #[case::from_sub("from fastapi.responses import HTMLResponse\n")]
    #[case::future("from __future__ import annotations\n")]
    fn allows_listed_packages(#[case] src: &str) {
        assert!(check(src, &[]).is_ok());
    }

    #[rstest]
    #[case::socket("import socket\n", "socket")]
    #[case::nested("def f():\n    import shutil\n", "shutil")]
    #[case::from("from ctypes import cdll\n", "ctypes")]
    #[case::in_try("try:\n    pass\nexcept Exception:\n    import pickle\n", "pickle")]
    #[case::second_alias("import json, socket\n", "socket")]
    fn rejects_unlisted_packages(#[case] src: &str, #[case] package: &str) {
        let err = check(src, &[]).unwrap_err();
        assert_eq!(err.message, format!("Import '{package}' is not allowed"));
    }

    #[test]
    fn reports_line_of_offending_import() {
        let err = check("import json\n\nimport socket\n", &[]).unwrap_err();
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn stops_at_first_violation() {
        let err = check("import socket\nimport shutil\n", &[]).unwrap_err();
        assert!(err.message.contains("socket"));
    }

    #[test]
    fn local_modules_are_importable() {
        assert!(check("from util import helper\nimport models\n", &["util", "models"]).is_ok());
        assert!(check("from util import helper\n", &[]).is_err());
    }

    #[test]
    fn relative_imports_resolve_against_local_modules() {
        assert!(check("from . import util\n", &["util"]).is_ok());
        assert!(check("from .util import helper\n", &["util"]).is_ok());
        assert!(check("from . import secrets_dump\n", &["util"]).is_err());
    }

    #[test]
    fn override_replaces_default_list() {
        let allowed = AllowedImports::from_override(Some(vec!["numpy".to_string()]));
        assert!(allowed.contains("numpy"));
        assert!(!allowed.contains("json"));
        assert!(AllowedImports::from_override(None).contains("json"));
    }
}
