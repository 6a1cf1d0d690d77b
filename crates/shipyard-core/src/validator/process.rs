//! Process - OS コマンド実行とプロセス生成の AST ゲート
//!
//! import 文と単純な代入から `os` / `subprocess` に束縛された名前を集め、
//! その名前経由の危険な属性参照を呼び出しの有無に関係なく拒否します。
//!
//! # 拒否するもの
//! - `o.system` / `sp.run` など、別名を含むモジュール経由の参照（`run = os.system` も）
//! - `from os import system as s`、`from subprocess import ...`
//! - `from os import *`、`from subprocess import *`
//! - `getattr(<os|subprocess の別名>, ...)`
//!
//! regex の security ゲートはこの後に走る二段目です。

use std::collections::BTreeMap;

use rustpython_parser::ast;

use super::security::forbidden_construct;
use super::syntax::line_of;
use crate::domain::ValidationFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Module {
    Os,
    Subprocess,
}

impl Module {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "os" => Some(Module::Os),
            "subprocess" => Some(Module::Subprocess),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Module::Os => "os",
            Module::Subprocess => "subprocess",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Module::Os => "OS command execution",
            Module::Subprocess => "process spawning",
        }
    }

    /// `subprocess` はどの属性も拒否
    fn forbids(self, attr: &str) -> bool {
        match self {
            Module::Os => {
                matches!(attr, "system" | "popen")
                    || ["exec", "spawn", "fork", "posix_spawn"]
                        .iter()
                        .any(|prefix| attr.starts_with(prefix))
            }
            Module::Subprocess => true,
        }
    }
}

/// 入れ子の本体も含めて全文を順に訪問
fn visit_stmts<F>(body: &[ast::Stmt], f: &mut F) -> Result<(), ValidationFailure>
where
    F: FnMut(&ast::Stmt) -> Result<(), ValidationFailure>,
{
    for stmt in body {
        f(stmt)?;
        match stmt {
            ast::Stmt::FunctionDef(ast::StmtFunctionDef { body, .. })
            | ast::Stmt::AsyncFunctionDef(ast::StmtAsyncFunctionDef { body, .. })
            | ast::Stmt::ClassDef(ast::StmtClassDef { body, .. })
            | ast::Stmt::With(ast::StmtWith { body, .. })
            | ast::Stmt::AsyncWith(ast::StmtAsyncWith { body, .. }) => visit_stmts(body, f)?,
            ast::Stmt::If(ast::StmtIf { body, orelse, .. })
            | ast::Stmt::For(ast::StmtFor { body, orelse, .. })
            | ast::Stmt::AsyncFor(ast::StmtAsyncFor { body, orelse, .. })
            | ast::Stmt::While(ast::StmtWhile { body, orelse, .. }) => {
                visit_stmts(body, f)?;
                visit_stmts(orelse, f)?;
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
                visit_stmts(body, f)?;
                for handler in handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    visit_stmts(&h.body, f)?;
                }
                visit_stmts(orelse, f)?;
                visit_stmts(finalbody, f)?;
            }
            ast::Stmt::Match(ast::StmtMatch { cases, .. }) => {
                for case in cases {
                    visit_stmts(&case.body, f)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

struct ProcessGate<'a> {
    source: &'a str,
    /// 名前 → 束縛されているモジュール
    bindings: BTreeMap<String, Module>,
}

impl ProcessGate<'_> {
    fn reject(&self, snippet: &str, module: Module, offset: usize) -> ValidationFailure {
        forbidden_construct(snippet, module.label()).at_line(line_of(self.source, offset))
    }

    fn bound<'e>(&self, expr: &'e ast::Expr) -> Option<(&'e str, Module)> {
        match expr {
            ast::Expr::Name(ast::ExprName { id, .. }) => {
                self.bindings.get(id.as_str()).map(|module| (id.as_str(), *module))
            }
            _ => None,
        }
    }

    /// `import os` / `import os as o` / `o2 = o` を記録
    fn collect(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::Import(ast::StmtImport { names, .. }) => {
                for alias in names {
                    let full = alias.name.as_str();
                    match &alias.asname {
                        Some(asname) => {
                            if let Some(module) = Module::from_name(full) {
                                self.bindings.insert(asname.as_str().to_string(), module);
                            }
                        }
                        None => {
                            let top = full.split('.').next().unwrap_or(full);
                            if let Some(module) = Module::from_name(top) {
                                self.bindings.insert(top.to_string(), module);
                            }
                        }
                    }
                }
            }
            ast::Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                if let Some((_, module)) = self.bound(value) {
                    for target in targets {
                        if let ast::Expr::Name(ast::ExprName { id, .. }) = target {
                            self.bindings.insert(id.as_str().to_string(), module);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn check_import_from(&self, stmt: &ast::StmtImportFrom) -> Result<(), ValidationFailure> {
        let relative = stmt.level.as_ref().is_some_and(|l| l.to_u32() > 0);
        let Some(module_name) = stmt.module.as_ref().filter(|_| !relative) else {
            return Ok(());
        };
        let Some(module) = Module::from_name(module_name.as_str()) else {
            return Ok(());
        };
        for alias in &stmt.names {
            let name = alias.name.as_str();
            if name == "*" || module.forbids(name) {
                return Err(self.reject(
                    &format!("from {} import {name}", module.as_str()),
                    module,
                    u32::from(stmt.range.start()) as usize,
                ));
            }
        }
        Ok(())
    }

    fn check_stmt(&self, stmt: &ast::Stmt) -> Result<(), ValidationFailure> {
        match stmt {
            ast::Stmt::ImportFrom(import) => self.check_import_from(import),
            ast::Stmt::Expr(ast::StmtExpr { value, .. }) => self.check_expr(value),
            ast::Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                self.check_exprs(targets)?;
                self.check_expr(value)
            }
            ast::Stmt::AugAssign(ast::StmtAugAssign { target, value, .. }) => {
                self.check_expr(target)?;
                self.check_expr(value)
            }
            ast::Stmt::AnnAssign(ast::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => {
                self.check_expr(target)?;
                self.check_expr(annotation)?;
                self.check_opt(value)
            }
            ast::Stmt::Return(ast::StmtReturn { value, .. }) => self.check_opt(value),
            ast::Stmt::Delete(ast::StmtDelete { targets, .. }) => self.check_exprs(targets),
            ast::Stmt::FunctionDef(ast::StmtFunctionDef {
                decorator_list, returns, ..
            })
            | ast::Stmt::AsyncFunctionDef(ast::StmtAsyncFunctionDef {
                decorator_list, returns, ..
            }) => {
                self.check_exprs(decorator_list)?;
                self.check_opt(returns)
            }
            ast::Stmt::ClassDef(ast::StmtClassDef {
                bases,
                keywords,
                decorator_list,
                ..
            }) => {
                self.check_exprs(bases)?;
                self.check_keywords(keywords)?;
                self.check_exprs(decorator_list)
            }
            ast::Stmt::For(ast::StmtFor { target, iter, .. })
            | ast::Stmt::AsyncFor(ast::StmtAsyncFor { target, iter, .. }) => {
                self.check_expr(target)?;
                self.check_expr(iter)
            }
            ast::Stmt::While(ast::StmtWhile { test, .. }) | ast::Stmt::If(ast::StmtIf { test, .. }) => {
                self.check_expr(test)
            }
            ast::Stmt::With(ast::StmtWith { items, .. }) | ast::Stmt::AsyncWith(ast::StmtAsyncWith { items, .. }) => {
                for item in items {
                    self.check_expr(&item.context_expr)?;
                    self.check_opt(&item.optional_vars)?;
                }
                Ok(())
            }
            ast::Stmt::Match(ast::StmtMatch { subject, cases, .. }) => {
                self.check_expr(subject)?;
                for case in cases {
                    self.check_opt(&case.guard)?;
                }
                Ok(())
            }
            ast::Stmt::Raise(ast::StmtRaise { exc, cause, .. }) => {
                self.check_opt(exc)?;
                self.check_opt(cause)
            }
            ast::Stmt::Try(ast::StmtTry { handlers, .. }) | ast::Stmt::TryStar(ast::StmtTryStar { handlers, .. }) => {
                for handler in handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    self.check_opt(&h.type_)?;
                }
                Ok(())
            }
            ast::Stmt::Assert(ast::StmtAssert { test, msg, .. }) => {
                self.check_expr(test)?;
                self.check_opt(msg)
            }
            _ => Ok(()),
        }
    }

    fn check_opt(&self, expr: &Option<Box<ast::Expr>>) -> Result<(), ValidationFailure> {
        match expr {
            Some(expr) => self.check_expr(expr),
            None => Ok(()),
        }
    }

    fn check_exprs(&self, exprs: &[ast::Expr]) -> Result<(), ValidationFailure> {
        exprs.iter().try_for_each(|e| self.check_expr(e))
    }

    fn check_keywords(&self, keywords: &[ast::Keyword]) -> Result<(), ValidationFailure> {
        keywords.iter().try_for_each(|k| self.check_expr(&k.value))
    }

    fn check_generators(&self, generators: &[ast::Comprehension]) -> Result<(), ValidationFailure> {
        for generator in generators {
            self.check_expr(&generator.target)?;
            self.check_expr(&generator.iter)?;
            self.check_exprs(&generator.ifs)?;
        }
        Ok(())
    }

    fn check_expr(&self, expr: &ast::Expr) -> Result<(), ValidationFailure> {
        match expr {
            ast::Expr::Attribute(ast::ExprAttribute { value, attr, range, .. }) => {
                if let Some((name, module)) = self.bound(value)
                    && module.forbids(attr.as_str())
                {
                    return Err(self.reject(&format!("{name}.{}", attr.as_str()), module, u32::from(range.start()) as usize));
                }
                self.check_expr(value)
            }
            ast::Expr::Call(ast::ExprCall {
                func,
                args,
                keywords,
                range,
                ..
            }) => {
                if let ast::Expr::Name(ast::ExprName { id, .. }) = func.as_ref()
                    && id.as_str() == "getattr"
                    && let Some((name, module)) = args.first().and_then(|target| self.bound(target))
                {
                    return Err(self.reject(&format!("getattr({name}, ...)"), module, u32::from(range.start()) as usize));
                }
                self.check_expr(func)?;
                self.check_exprs(args)?;
                self.check_keywords(keywords)
            }
            ast::Expr::BoolOp(ast::ExprBoolOp { values, .. }) => self.check_exprs(values),
            ast::Expr::NamedExpr(ast::ExprNamedExpr { target, value, .. }) => {
                self.check_expr(target)?;
                self.check_expr(value)
            }
            ast::Expr::BinOp(ast::ExprBinOp { left, right, .. }) => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
            ast::Expr::UnaryOp(ast::ExprUnaryOp { operand, .. }) => self.check_expr(operand),
            ast::Expr::Lambda(ast::ExprLambda { body, .. }) => self.check_expr(body),
            ast::Expr::IfExp(ast::ExprIfExp { test, body, orelse, .. }) => {
                self.check_expr(test)?;
                self.check_expr(body)?;
                self.check_expr(orelse)
            }
            ast::Expr::Dict(ast::ExprDict { keys, values, .. }) => {
                keys.iter().flatten().try_for_each(|k| self.check_expr(k))?;
                self.check_exprs(values)
            }
            ast::Expr::Set(ast::ExprSet { elts, .. })
            | ast::Expr::List(ast::ExprList { elts, .. })
            | ast::Expr::Tuple(ast::ExprTuple { elts, .. }) => self.check_exprs(elts),
            ast::Expr::ListComp(ast::ExprListComp { elt, generators, .. })
            | ast::Expr::SetComp(ast::ExprSetComp { elt, generators, .. })
            | ast::Expr::GeneratorExp(ast::ExprGeneratorExp { elt, generators, .. }) => {
                self.check_expr(elt)?;
                self.check_generators(generators)
            }
            ast::Expr::DictComp(ast::ExprDictComp {
                key, value, generators, ..
            }) => {
                self.check_expr(key)?;
                self.check_expr(value)?;
                self.check_generators(generators)
            }
            ast::Expr::Await(ast::ExprAwait { value, .. })
            | ast::Expr::YieldFrom(ast::ExprYieldFrom { value, .. })
            | ast::Expr::Starred(ast::ExprStarred { value, .. }) => self.check_expr(value),
            ast::Expr::Yield(ast::ExprYield { value, .. }) => self.check_opt(value),
            ast::Expr::Compare(ast::ExprCompare { left, comparators, .. }) => {
                self.check_expr(left)?;
                self.check_exprs(comparators)
            }
            ast::Expr::FormattedValue(ast::ExprFormattedValue { value, format_spec, .. }) => {
                self.check_expr(value)?;
                self.check_opt(format_spec)
            }
            ast::Expr::JoinedStr(ast::ExprJoinedStr { values, .. }) => self.check_exprs(values),
            ast::Expr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                self.check_expr(value)?;
                self.check_expr(slice)
            }
            ast::Expr::Slice(ast::ExprSlice { lower, upper, step, .. }) => {
                self.check_opt(lower)?;
                self.check_opt(upper)?;
                self.check_opt(step)
            }
            _ => Ok(()),
        }
    }
}

/// `os` / `subprocess` 経由のコマンド実行・プロセス生成を拒否
pub(crate) fn check_process_access(source: &str, suite: &ast::Suite) -> Result<(), ValidationFailure> {
    let mut gate = ProcessGate {
        source,
        bindings: BTreeMap::new(),
    };
    visit_stmts(suite, &mut |stmt: &ast::Stmt| {
        gate.collect(stmt);
        Ok(())
    })?;
    visit_stmts(suite, &mut |stmt: &ast::Stmt| gate.check_stmt(stmt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::syntax::parse;
    use rstest::rstest;

    fn check(src: &str) -> Result<(), ValidationFailure> {
        let suite = parse(src, "<test>").unwrap();
        check_process_access(src, &suite)
    }

    #[rstest]
    #[case::module_alias("import os as o\no.system('rm -rf /')\n", "o.system")]
    #[case::star_os("from os import *\nsystem('id')\n", "from os import *")]
    #[case::star_subprocess("from subprocess import *\n", "from subprocess import *")]
    #[case::renamed_function("from os import system as s\ns('id')\n", "from os import system")]
    #[case::from_subprocess("from subprocess import run\n", "from subprocess import run")]
    #[case::stored_reference("import os\nrun = os.system\nrun('id')\n", "os.system")]
    #[case::getattr("import os\ngetattr(os, 'system')('id')\n", "getattr(os, ...)")]
    #[case::getattr_alias("import subprocess as sp\ngetattr(sp, 'run')(['ls'])\n", "getattr(sp, ...)")]
    #[case::reassigned_module("import os\nshell = os\nshell.popen('id')\n", "shell.popen")]
    #[case::subprocess_alias("import subprocess as sp\nsp.check_output(['id'])\n", "sp.check_output")]
    #[case::os_exec_family("import os\nos.execvp('sh', ['sh'])\n", "os.execvp")]
    #[case::inside_function("import os\ndef handler():\n    return [os.spawnl(0, 'x')]\n", "os.spawnl")]
    #[case::in_dict_literal("import os\nACTIONS = {'run': os.system}\n", "os.system")]
    #[case::nested_import("def f():\n    import os as o\n    o.fork()\n", "o.fork")]
    fn rejects_process_access(#[case] src: &str, #[case] snippet: &str) {
        let err = check(src).unwrap_err();
        assert!(
            err.message.contains(&format!("'{snippet}'")),
            "unexpected message for {src:?}: {}",
            err.message
        );
    }

    #[rstest]
    #[case::environ("import os\nURL = os.environ.get('DATABASE_URL')\n")]
    #[case::path_join("import os\np = os.path.join('a', 'b')\n")]
    #[case::from_os_path("from os import path, environ\n")]
    #[case::getattr_other("import json\ngetattr(json, 'dumps')({})\n")]
    #[case::unrelated_system("class Box:\n    system = 1\nBox.system\n")]
    #[case::relative_os("from .os import system\n")]
    fn allows_safe_usage(#[case] src: &str) {
        assert!(check(src).is_ok(), "unexpected rejection: {src}");
    }

    #[test]
    fn reports_line_of_reference() {
        let err = check("import os as o\n\nx = 1\no.system('id')\n").unwrap_err();
        assert_eq!(err.line, Some(4));
    }
}
