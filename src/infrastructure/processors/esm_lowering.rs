// ES module → registry (CommonJS-style) lowering
//
// Walks the top-level statements of an oxc program and replaces each
// import/export by span. Replacements never add lines, so every input line
// keeps its number and line-level source maps stay valid.

use crate::infrastructure::processors::js_ast::{apply_edits, Edit, ModuleCalls};
use oxc_ast::ast::{
    BindingPattern, BindingPatternKind, Declaration, ExportAllDeclaration,
    ExportDefaultDeclaration, ExportDefaultDeclarationKind, ExportNamedDeclaration,
    ImportDeclaration, ImportDeclarationSpecifier, Program, Statement,
};
use oxc_span::{GetSpan, Span};

/// Result of lowering one ES module
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoweredModule {
    pub code: String,
    /// Named exports, without `default`
    pub exports: Vec<String>,
    pub has_default: bool,
    /// Specifiers of `export * from` statements
    pub star_reexports: Vec<String>,
    /// Every specifier the module loads (imports, re-exports, `import()` and
    /// `require()`), deduplicated, in source order
    pub specifiers: Vec<String>,
}

#[derive(Default)]
struct Lowering {
    edits: Vec<Edit>,
    getters: Vec<(String, String)>,
    loads: Vec<(u32, String)>,
    module: LoweredModule,
    temp_counter: usize,
}

impl Lowering {
    fn temp(&mut self, prefix: &str) -> String {
        let name = format!("__{}{}", prefix, self.temp_counter);
        self.temp_counter += 1;
        name
    }

    fn load(&mut self, span: Span, specifier: &str) {
        self.loads.push((span.start, specifier.to_string()));
    }

    fn export(&mut self, name: &str, expr: &str) {
        if name == "default" {
            self.module.has_default = true;
        } else if !self.module.exports.iter().any(|e| e == name) {
            self.module.exports.push(name.to_string());
        }
        self.getters.push((name.to_string(), expr.to_string()));
    }

    fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.edits.push(Edit::new(span, text));
    }

    fn import(&mut self, decl: &ImportDeclaration) {
        let spec = decl.source.value.as_str();
        self.load(decl.span, spec);
        let require = format!("require({})", quote(spec));

        let mut default = None;
        let mut namespace = None;
        let mut named = Vec::new();
        for specifier in decl.specifiers.iter().flatten() {
            match specifier {
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    default = Some(s.local.name.to_string())
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    namespace = Some(s.local.name.to_string())
                }
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    named.push((s.imported.name().to_string(), s.local.name.to_string()))
                }
            }
        }

        let parts = default.is_some() as usize + namespace.is_some() as usize + (!named.is_empty()) as usize;
        let text = match parts {
            0 => format!("{};", require),
            1 => {
                if let Some(default) = default {
                    format!("const {} = __toDefault({});", default, require)
                } else if let Some(namespace) = namespace {
                    format!("const {} = {};", namespace, require)
                } else {
                    destructure(&require, &named)
                }
            }
            _ => {
                let temp = self.temp("import");
                let mut out = vec![format!("const {} = {};", temp, require)];
                if let Some(default) = default {
                    out.push(format!("const {} = __toDefault({});", default, temp));
                }
                if let Some(namespace) = namespace {
                    out.push(format!("const {} = {};", namespace, temp));
                }
                if !named.is_empty() {
                    out.push(destructure(&temp, &named));
                }
                out.join(" ")
            }
        };
        self.replace(decl.span, text);
    }

    fn export_all(&mut self, decl: &ExportAllDeclaration) {
        let spec = decl.source.value.as_str();
        self.load(decl.span, spec);
        let require = format!("require({})", quote(spec));

        match &decl.exported {
            Some(name) => {
                let temp = self.temp("ns");
                self.export(name.name().as_str(), &temp);
                self.replace(decl.span, format!("const {} = {};", temp, require));
            }
            None => {
                self.module.star_reexports.push(spec.to_string());
                self.replace(decl.span, format!("__reExport(exports, {});", require));
            }
        }
    }

    fn export_named(&mut self, decl: &ExportNamedDeclaration) {
        if let Some(source) = &decl.source {
            let spec = source.value.as_str();
            self.load(decl.span, spec);

            let temp = self.temp("reexport");
            for specifier in &decl.specifiers {
                let imported = specifier.local.name();
                let expr = if imported.as_str() == "default" {
                    format!("__toDefault({})", temp)
                } else {
                    format!("{}.{}", temp, imported)
                };
                self.export(specifier.exported.name().as_str(), &expr);
            }
            self.replace(decl.span, format!("const {} = require({});", temp, quote(spec)));
            return;
        }

        let Some(declaration) = &decl.declaration else {
            for specifier in &decl.specifiers {
                self.export(specifier.exported.name().as_str(), specifier.local.name().as_str());
            }
            self.replace(decl.span, "");
            return;
        };

        let mut names = Vec::new();
        match declaration {
            Declaration::VariableDeclaration(var) => {
                for declarator in &var.declarations {
                    binding_names(&declarator.id, &mut names);
                }
            }
            Declaration::FunctionDeclaration(func) => names.extend(func.id.as_ref().map(|id| id.name.to_string())),
            Declaration::ClassDeclaration(class) => names.extend(class.id.as_ref().map(|id| id.name.to_string())),
            _ => {}
        }
        for name in &names {
            self.export(name, name);
        }
        self.replace(Span::new(decl.span.start, declaration.span().start), "");
    }

    fn export_default(&mut self, decl: &ExportDefaultDeclaration) {
        let (name, is_declaration) = match &decl.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                (func.id.as_ref().map(|id| id.name.to_string()), true)
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                (class.id.as_ref().map(|id| id.name.to_string()), true)
            }
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => return,
            _ => (None, false),
        };

        let body = decl.declaration.span();
        let prefix = Span::new(decl.span.start, body.start);
        match name {
            Some(name) => {
                self.export("default", &name);
                self.replace(prefix, "");
            }
            None => {
                self.export("default", "__default");
                self.replace(prefix, "const __default = ");
                // A function or class declaration has no terminator of its own
                if is_declaration {
                    self.replace(Span::new(body.end, body.end), ";");
                }
            }
        }
    }
}

/// Lower a parsed ES module into the body of a registry factory.
///
/// The result expects `module`, `exports` and `require` in scope, plus the
/// runtime helpers `__export`, `__reExport` and `__toDefault`.
pub fn lower_esm(program: &Program, source: &str) -> LoweredModule {
    let mut state = Lowering::default();

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => state.import(decl),
            Statement::ExportAllDeclaration(decl) => state.export_all(decl),
            Statement::ExportNamedDeclaration(decl) => state.export_named(decl),
            Statement::ExportDefaultDeclaration(decl) => state.export_default(decl),
            _ => {}
        }
    }

    let calls = ModuleCalls::collect(program);
    for import in &calls.dynamic_imports {
        state.load(import.span, &import.specifier);
        state.replace(
            import.span,
            format!("Promise.resolve().then(() => require({}))", quote(&import.specifier)),
        );
    }
    for (spec, span) in &calls.requires {
        state.load(*span, spec);
    }

    state.loads.sort_by_key(|(start, _)| *start);
    for (_, spec) in std::mem::take(&mut state.loads) {
        if !state.module.specifiers.contains(&spec) {
            state.module.specifiers.push(spec);
        }
    }

    let code = apply_edits(source, std::mem::take(&mut state.edits));

    // Getters are hoisted onto the first line so circular importers see them
    let header = format!(
        "__export(exports, {{{}}});",
        state
            .getters
            .iter()
            .map(|(name, expr)| format!(" {}: () => {}", export_key(name), expr))
            .collect::<Vec<_>>()
            .join(",")
            + if state.getters.is_empty() { "" } else { " " }
    );
    state.module.code = if code.is_empty() {
        header
    } else {
        format!("{} {}", header, code)
    };
    state.module
}

/// Every name bound by a declaration pattern
fn binding_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPatternKind::ObjectPattern(object) => {
            for property in &object.properties {
                binding_names(&property.value, names);
            }
            if let Some(rest) = &object.rest {
                binding_names(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                binding_names(element, names);
            }
            if let Some(rest) = &array.rest {
                binding_names(&rest.argument, names);
            }
        }
        BindingPatternKind::AssignmentPattern(assign) => binding_names(&assign.left, names),
    }
}

fn destructure(source: &str, named: &[(String, String)]) -> String {
    let fields = named
        .iter()
        .map(|(imported, local)| {
            if imported == local {
                local.clone()
            } else {
                format!("{}: {}", export_key(imported), local)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("const {{ {} }} = {};", fields, source)
}

fn quote(spec: &str) -> String {
    serde_json::Value::String(spec.to_string()).to_string()
}

fn export_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
