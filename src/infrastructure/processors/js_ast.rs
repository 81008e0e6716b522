// oxc-backed source analysis shared by the bundler and the dev server
//
// Everything here edits the original text by span. Edits never remove
// newlines, so line-level source maps stay valid.

use crate::utils::{DevkitError, ErrorContext, Result};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, CallExpression, Expression, IdentifierReference, ImportExpression, Program,
    Statement, StaticMemberExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::{ParseOptions, Parser};
use oxc_span::{SourceType, Span};
use std::collections::BTreeMap;
use std::path::Path;

/// Parse `code` as a module, retrying as a script for sloppy-mode CommonJS.
///
/// Top-level `return` is accepted since CommonJS bodies run inside a function.
pub fn parse_program<'a>(allocator: &'a Allocator, code: &'a str, path: &Path) -> Result<Program<'a>> {
    let source_type = SourceType::from_path(path).unwrap_or_default();

    let module = Parser::new(allocator, code, source_type.with_module(true))
        .with_options(parse_options())
        .parse();
    if module.errors.is_empty() && !module.panicked {
        return Ok(module.program);
    }

    let script = Parser::new(allocator, code, source_type.with_module(false))
        .with_options(parse_options())
        .parse();
    if script.errors.is_empty() && !script.panicked {
        return Ok(script.program);
    }

    let error = &module.errors[0];
    let offset = error
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map(|label| label.offset())
        .unwrap_or(0);
    Err(parse_error(&error.message, code, offset, path))
}

fn parse_options() -> ParseOptions {
    ParseOptions {
        allow_return_outside_function: true,
        ..ParseOptions::default()
    }
}

/// `Parse` error pointing at byte `offset` of `code`, with a few lines around it
fn parse_error(message: &str, code: &str, offset: usize, path: &Path) -> DevkitError {
    let offset = offset.min(code.len());
    let before = &code[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0) + 1;

    let first = line.saturating_sub(2).max(1);
    let snippet = code
        .lines()
        .skip(first - 1)
        .take(line - first + 3)
        .collect::<Vec<_>>()
        .join("\n");

    let context = ErrorContext::new()
        .with_file(path.to_path_buf())
        .with_location(line - first + 1, column)
        .with_snippet(snippet);
    DevkitError::parse_with_context(
        format!("{} ({}:{}:{})", message, path.display(), line, column),
        context,
    )
}

/// True when the program has any import or export declaration
pub fn is_esm(program: &Program) -> bool {
    program.body.iter().any(|stmt| {
        matches!(
            stmt,
            Statement::ImportDeclaration(_)
                | Statement::ExportAllDeclaration(_)
                | Statement::ExportDefaultDeclaration(_)
                | Statement::ExportNamedDeclaration(_)
        )
    })
}

/// A text replacement over `start..end` of the original source
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub start: u32,
    pub end: u32,
    pub text: String,
}

impl Edit {
    pub fn new(span: Span, text: impl Into<String>) -> Self {
        Self {
            start: span.start,
            end: span.end,
            text: text.into(),
        }
    }
}

/// Apply non-overlapping edits. Newlines dropped by an edit are appended to
/// its replacement so every original line keeps its number.
pub fn apply_edits(code: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| (e.start, e.end));

    let mut out = String::with_capacity(code.len());
    let mut copied_to = 0usize;

    for edit in edits {
        let (start, end) = (edit.start as usize, edit.end as usize);
        if start < copied_to || end > code.len() {
            continue;
        }
        out.push_str(&code[copied_to..start]);
        out.push_str(&edit.text);

        let removed = code[start..end].matches('\n').count();
        let added = edit.text.matches('\n').count();
        for _ in added..removed {
            out.push('\n');
        }
        copied_to = end;
    }

    out.push_str(&code[copied_to..]);
    out
}

/// An `import("x")` expression with a string literal argument
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicImport {
    pub specifier: String,
    /// The whole `import(...)` expression
    pub span: Span,
    /// The string literal, quotes included
    pub source_span: Span,
}

/// `require("x")` and `import("x")` calls with string literal arguments
#[derive(Debug, Default)]
pub struct ModuleCalls {
    /// Specifier and span of the string literal, quotes included
    pub requires: Vec<(String, Span)>,
    pub dynamic_imports: Vec<DynamicImport>,
}

impl ModuleCalls {
    pub fn collect(program: &Program) -> Self {
        let mut calls = Self::default();
        calls.visit_program(program);
        calls
    }

    /// `require` specifiers, deduplicated, in source order
    pub fn require_specifiers(&self) -> Vec<String> {
        let mut specifiers: Vec<String> = Vec::new();
        for (spec, _) in &self.requires {
            if !specifiers.contains(spec) {
                specifiers.push(spec.clone());
            }
        }
        specifiers
    }
}

impl<'a> Visit<'a> for ModuleCalls {
    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let (Expression::Identifier(callee), [Argument::StringLiteral(source)]) =
            (&it.callee, &it.arguments[..])
        {
            if callee.name.as_str() == "require" {
                self.requires.push((source.value.to_string(), source.span));
            }
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        if let Expression::StringLiteral(source) = &it.source {
            self.dynamic_imports.push(DynamicImport {
                specifier: source.value.to_string(),
                span: it.span,
                source_span: source.span,
            });
        }
        walk::walk_import_expression(self, it);
    }
}

/// A specifier string literal of an import, re-export or `import()` call
#[derive(Debug, Clone, PartialEq)]
pub struct SpecifierLiteral {
    pub specifier: String,
    /// Quotes included
    pub span: Span,
    pub is_dynamic_import: bool,
}

/// Specifier literals of static imports, re-exports and `import()` calls, in source order
pub fn import_specifiers(code: &str, path: &Path) -> Result<Vec<SpecifierLiteral>> {
    let allocator = Allocator::default();
    let program = parse_program(&allocator, code, path)?;

    let mut found: Vec<SpecifierLiteral> = program
        .body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::ImportDeclaration(decl) => Some(&decl.source),
            Statement::ExportAllDeclaration(decl) => Some(&decl.source),
            Statement::ExportNamedDeclaration(decl) => decl.source.as_ref(),
            _ => None,
        })
        .map(|source| SpecifierLiteral {
            specifier: source.value.to_string(),
            span: source.span,
            is_dynamic_import: false,
        })
        .collect();

    found.extend(
        ModuleCalls::collect(&program)
            .dynamic_imports
            .into_iter()
            .map(|import| SpecifierLiteral {
                specifier: import.specifier,
                span: import.source_span,
                is_dynamic_import: true,
            }),
    );
    found.sort_by_key(|literal| literal.span.start);
    Ok(found)
}

/// Point `require("specifier")` calls at registry ids
pub fn rewrite_requires(
    code: &str,
    path: &Path,
    dependencies: &BTreeMap<String, String>,
) -> Result<String> {
    if dependencies.is_empty() {
        return Ok(code.to_string());
    }

    let allocator = Allocator::default();
    let program = parse_program(&allocator, code, path)?;
    let edits = ModuleCalls::collect(&program)
        .requires
        .into_iter()
        .filter_map(|(spec, span)| {
            dependencies
                .get(&spec)
                .map(|id| Edit::new(span, serde_json::Value::String(id.clone()).to_string()))
        })
        .collect();

    Ok(apply_edits(code, edits))
}

/// Finds expressions whose dotted name is a `define` key
struct DefineReplacer<'d> {
    defines: &'d BTreeMap<String, String>,
    edits: Vec<Edit>,
}

impl<'a> Visit<'a> for DefineReplacer<'_> {
    fn visit_static_member_expression(&mut self, it: &StaticMemberExpression<'a>) {
        if let Some(value) = dotted_name(&it.object)
            .map(|object| format!("{}.{}", object, it.property.name))
            .and_then(|name| self.defines.get(&name))
        {
            self.edits.push(Edit::new(it.span, value.clone()));
            return;
        }
        walk::walk_static_member_expression(self, it);
    }

    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        if let Some(value) = self.defines.get(it.name.as_str()) {
            self.edits.push(Edit::new(it.span, value.clone()));
        }
    }
}

/// `a.b.c` for a chain of identifiers and static member accesses
fn dotted_name(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Identifier(id) => Some(id.name.to_string()),
        Expression::StaticMemberExpression(member) => {
            Some(format!("{}.{}", dotted_name(&member.object)?, member.property.name))
        }
        _ => None,
    }
}

/// Replace every expression matching a `define` key with its value.
///
/// Only real expressions are replaced, never text inside strings, templates
/// or comments. The outermost match wins, so `process.env.NODE_ENV` is
/// replaced whole even when `process.env` is also defined.
pub fn apply_defines(code: &str, path: &Path, defines: &BTreeMap<String, String>) -> Result<String> {
    if defines.is_empty() {
        return Ok(code.to_string());
    }

    let allocator = Allocator::default();
    let program = parse_program(&allocator, code, path)?;
    let mut replacer = DefineReplacer {
        defines,
        edits: Vec::new(),
    };
    replacer.visit_program(&program);

    Ok(apply_edits(code, replacer.edits))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_requires(code: &str, path: &Path) -> Result<Vec<String>> {
        let allocator = Allocator::default();
        let program = parse_program(&allocator, code, path)?;
        Ok(ModuleCalls::collect(&program).require_specifiers())
    }

    fn defines(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_apply_defines_respects_boundaries() {
        let defines = defines(&[
            ("process.env.NODE_ENV", "\"production\""),
            ("process.env", "{}"),
        ]);
        let code = "if (process.env.NODE_ENV !== 'production') {}\n\
                    const x = myprocess.env.NODE_ENV;\n\
                    const y = a.process.env.NODE_ENV;\n\
                    const z = process.env.NODE_ENVX;\n\
                    const w = process.env;";

        let result = apply_defines(code, Path::new("a.js"), &defines).unwrap();

        assert!(result.contains("if (\"production\" !== 'production') {}"));
        assert!(result.contains("const x = myprocess.env.NODE_ENV;"));
        assert!(result.contains("const y = a.process.env.NODE_ENV;"));
        assert!(result.contains("const z = {}.NODE_ENVX;"));
        assert!(result.contains("const w = {};"));
    }

    #[test]
    fn test_apply_defines_leaves_strings_and_comments() {
        let defines = defines(&[("process.env.NODE_ENV", "\"development\"")]);
        let code = "// set process.env.NODE_ENV first\n\
                    console.warn('Set process.env.NODE_ENV to production');\n\
                    const t = `${process.env.NODE_ENV} is process.env.NODE_ENV`;";

        let result = apply_defines(code, Path::new("a.js"), &defines).unwrap();

        assert_eq!(
            result,
            "// set process.env.NODE_ENV first\n\
             console.warn('Set process.env.NODE_ENV to production');\n\
             const t = `${\"development\"} is process.env.NODE_ENV`;"
        );
    }

    #[test]
    fn test_apply_defines_identifier_key() {
        let defines = defines(&[("__DEV__", "false")]);
        let result = apply_defines("if (__DEV__) { obj.__DEV__ = 1; }", Path::new("a.js"), &defines).unwrap();
        assert_eq!(result, "if (false) { obj.__DEV__ = 1; }");
    }

    #[test]
    fn test_apply_defines_empty_is_identity() {
        let code = "console.log(process.env.NODE_ENV);";
        assert_eq!(apply_defines(code, Path::new("a.js"), &BTreeMap::new()).unwrap(), code);
    }

    #[test]
    fn test_collect_and_rewrite_requires() {
        let code = "var a = require('./a');\n\
                    var b = require(\"b\");\n\
                    var a2 = require('./a');\n\
                    // require('./commented')\n\
                    var s = \"require('./in-string')\";";
        let path = Path::new("index.js");
        assert_eq!(collect_requires(code, path).unwrap(), vec!["./a", "b"]);

        let deps = defines(&[("./a", "node_modules/pkg/a.js")]);
        let rewritten = rewrite_requires(code, path, &deps).unwrap();

        assert!(rewritten.contains("var a = require(\"node_modules/pkg/a.js\");"));
        assert!(rewritten.contains("var a2 = require(\"node_modules/pkg/a.js\");"));
        assert!(rewritten.contains("require(\"b\")"));
        assert!(rewritten.contains("\"require('./in-string')\""));
    }

    #[test]
    fn test_import_specifiers() {
        let code = "import a from './a.js';\n\
                    // import b from './commented.js';\n\
                    export * from 'lib';\n\
                    export { c } from \"./c.js\";\n\
                    const s = \"import('./in-string.js')\";\n\
                    const lazy = import('./lazy.js');";

        let found = import_specifiers(code, Path::new("main.js")).unwrap();
        let specifiers: Vec<(&str, bool)> = found
            .iter()
            .map(|l| (l.specifier.as_str(), l.is_dynamic_import))
            .collect();

        assert_eq!(
            specifiers,
            vec![("./a.js", false), ("lib", false), ("./c.js", false), ("./lazy.js", true)]
        );
        let first = &found[0];
        assert_eq!(&code[first.span.start as usize..first.span.end as usize], "'./a.js'");
    }

    #[test]
    fn test_commonjs_top_level_return_parses() {
        let code = "if (typeof window === 'undefined') return;\nmodule.exports = require('./browser');";
        assert_eq!(collect_requires(code, Path::new("index.js")).unwrap(), vec!["./browser"]);
    }

    #[test]
    fn test_parse_error_has_location() {
        let err = collect_requires("const a = 1;\nconst = ;\n", Path::new("src/broken.js")).unwrap_err();

        match &err {
            DevkitError::Parse { message, context } => {
                assert!(message.contains("src/broken.js:2:"));
                let context = context.as_ref().unwrap();
                assert_eq!(context.file_path.as_deref(), Some(Path::new("src/broken.js")));
                assert!(context.code_snippet.as_deref().unwrap().contains("const = ;"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(err.format_detailed().contains("→"));
    }

    #[test]
    fn test_apply_edits_keeps_line_count() {
        let code = "import {\n  a,\n} from 'x';\nuse(a);";
        let edits = vec![Edit {
            start: 0,
            end: 25,
            text: "const { a } = require(\"x\");".to_string(),
        }];
        let out = apply_edits(code, edits);
        assert_eq!(out, "const { a } = require(\"x\");\n\n\nuse(a);");
    }
}
