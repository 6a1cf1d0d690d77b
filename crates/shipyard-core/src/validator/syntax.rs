//! Syntax - パースと app 存在チェック

use rustpython_parser::{Parse, ast};

use crate::domain::ValidationFailure;

/// Callables that build a single app object (`app = FastAPI()`).
const SINGLE_APP_CONSTRUCTORS: &[&str] = &["FastAPI", "FastHTML", "Flask", "Starlette"];

/// Callables that return an `(app, router)` pair (`app, rt = fast_app()`).
const PAIR_APP_CONSTRUCTORS: &[&str] = &["fast_app"];

pub const MISSING_APP_MESSAGE: &str = "No app instance found. Create one at module level, \
     e.g. `app = FastAPI()` or `app, rt = fast_app()`";

/// 1-based line of a byte offset.
pub(crate) fn line_of(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

pub(crate) fn parse(source: &str, source_path: &str) -> Result<ast::Suite, ValidationFailure> {
    ast::Suite::parse(source, source_path).map_err(|err| {
        let offset = u32::from(err.offset) as usize;
        ValidationFailure::new(format!("Syntax error: {}", err.error)).at_line(line_of(source, offset))
    })
}

/// Last path segment of the called expression: `FastAPI()` and
/// `fastapi.FastAPI()` both yield `FastAPI`.
fn callee_name(expr: &ast::Expr) -> Option<&str> {
    let ast::Expr::Call(ast::ExprCall { func, .. }) = expr else {
        return None;
    };
    match func.as_ref() {
        ast::Expr::Name(ast::ExprName { id, .. }) => Some(id.as_str()),
        ast::Expr::Attribute(ast::ExprAttribute { attr, .. }) => Some(attr.as_str()),
        _ => None,
    }
}

fn is_single_constructor(value: &ast::Expr) -> bool {
    callee_name(value).is_some_and(|name| SINGLE_APP_CONSTRUCTORS.contains(&name))
}

fn is_pair_constructor(value: &ast::Expr) -> bool {
    callee_name(value).is_some_and(|name| PAIR_APP_CONSTRUCTORS.contains(&name))
}

fn is_app_assignment(stmt: &ast::Stmt) -> bool {
    match stmt {
        ast::Stmt::Assign(ast::StmtAssign { targets, value, .. }) => match targets.as_slice() {
            [ast::Expr::Name(_)] => is_single_constructor(value),
            [ast::Expr::Tuple(ast::ExprTuple { elts, .. })] => {
                !elts.is_empty()
                    && elts.iter().all(|e| matches!(e, ast::Expr::Name(_)))
                    && is_pair_constructor(value)
            }
            _ => false,
        },
        ast::Stmt::AnnAssign(ast::StmtAnnAssign {
            target,
            value: Some(value),
            ..
        }) => matches!(target.as_ref(), ast::Expr::Name(_)) && is_single_constructor(value),
        _ => false,
    }
}

/// Only module-level assignments count; an app built inside a function is
/// not visible to the runtime.
pub(crate) fn check_app_presence(suite: &ast::Suite) -> Result<(), ValidationFailure> {
    if suite.iter().any(is_app_assignment) {
        Ok(())
    } else {
        Err(ValidationFailure::new(MISSING_APP_MESSAGE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn presence(src: &str) -> Result<(), ValidationFailure> {
        let suite = parse(src, "<test>").unwrap();
        check_app_presence(&suite)
    }

    #[rstest]
    #[case::fastapi("from fastapi import FastAPI\napp = FastAPI()\n")]
    #[case::qualified("import fastapi\napp = fastapi.FastAPI(title='x')\n")]
    #[case::fasthtml_pair("from fasthtml.common import *\napp, rt = fast_app()\n")]
    #[case::annotated("from fastapi import FastAPI\napp: FastAPI = FastAPI()\n")]
    #[case::flask("from flask import Flask\nserver = Flask(__name__)\n")]
    fn accepts_app_construction(#[case] src: &str) {
        assert!(presence(src).is_ok());
    }

    #[rstest]
    #[case::none("x = 1\n")]
    #[case::nested("from fastapi import FastAPI\ndef make():\n    app = FastAPI()\n    return app\n")]
    #[case::pair_into_single("app = fast_app()\n")]
    #[case::single_into_tuple("app, rt = FastAPI()\n")]
    #[case::attribute_target("from fastapi import FastAPI\nself.app = FastAPI()\n")]
    fn rejects_missing_app(#[case] src: &str) {
        let err = presence(src).unwrap_err();
        assert_eq!(err.message, MISSING_APP_MESSAGE);
    }

    #[test]
    fn syntax_error_reports_line() {
        let err = parse("x = 1\ny = (\n", "<test>").unwrap_err();
        assert!(err.message.starts_with("Syntax error"));
        assert!(err.line.is_some_and(|l| l >= 2));
    }

    #[test]
    fn line_of_counts_newlines() {
        let src = "a\nb\nc";
        assert_eq!(line_of(src, 0), 1);
        assert_eq!(line_of(src, 2), 2);
        assert_eq!(line_of(src, 4), 3);
        assert_eq!(line_of(src, 999), 3);
    }
}
