use crate::core::interfaces::{Bundler, FileSystemService};
use crate::core::models::*;
use crate::core::plugin::{PluginContext, PluginManager};
use crate::infrastructure::file_system::TokioFileSystemService;
use crate::infrastructure::node_resolver::{NodeModuleResolver, Resolution};
use crate::infrastructure::processors::esm_lowering::lower_esm;
use crate::infrastructure::processors::js_ast::{
    apply_defines, is_esm, parse_program, rewrite_requires, ModuleCalls,
};
use crate::utils::{
    source_mapping_url, DevkitError, Logger, PathAliasResolver, Result,
    SourceMapBuilder, Timer,
};
use async_trait::async_trait;
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Registry id of modules stubbed out by a `browser: { "x": false }` mapping
const EMPTY_MODULE_ID: &str = "__empty__";

/// Helpers every bundle needs: a module registry plus ESM interop.
const RUNTIME: &str = r#"var __registry = {};
var __cache = {};
function __define(id, factory) {
  __registry[id] = factory;
}
function __require(id) {
  var cached = __cache[id];
  if (cached) return cached.exports;
  var factory = __registry[id];
  if (!factory) throw new Error('Could not resolve "' + id + '"');
  var module = (__cache[id] = { exports: {} });
  factory(module, module.exports, __require);
  return module.exports;
}
function __export(target, getters) {
  Object.defineProperty(target, "__esModule", { value: true });
  for (var name in getters) Object.defineProperty(target, name, { get: getters[name], enumerable: true });
}
function __reExport(target, source) {
  Object.keys(source).forEach(function (name) {
    if (name !== "default" && !Object.prototype.hasOwnProperty.call(target, name)) {
      Object.defineProperty(target, name, { get: function () { return source[name]; }, enumerable: true });
    }
  });
}
function __toDefault(mod) {
  return mod && mod.__esModule ? mod.default : mod;
}
"#;

const RUNTIME_EXPORTS: &str = "__define, __require, __export, __reExport, __toDefault";

/// Outcome of resolving one specifier during the graph walk
enum Resolved {
    Module(PathBuf),
    Empty,
    External,
    Unresolved,
}

/// In-process bundler: walks the module graph from the entry points, lowers
/// ES modules into a CommonJS-style registry and emits one file per entry.
pub struct NativeBundler {
    resolver: Arc<NodeModuleResolver>,
    fs: Arc<dyn FileSystemService>,
}

impl NativeBundler {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(NodeModuleResolver::new()),
            fs: Arc::new(TokioFileSystemService),
        }
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystemService>) -> Self {
        self.fs = fs;
        self
    }
}

impl Default for NativeBundler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bundler for NativeBundler {
    fn name(&self) -> &str {
        "native"
    }

    async fn build(&self, options: &BundleOptions) -> Result<BundleResult> {
        if options.splitting && options.format != ModuleFormat::Esm {
            return Err(DevkitError::config(format!(
                "Code splitting requires the esm format, got {}",
                options.format
            )));
        }

        if options.entry_points.is_empty() {
            Logger::debug("No entry points to bundle");
            return Ok(BundleResult::default());
        }

        let _timer = Timer::start("Native bundle");

        let mut session = BuildSession::new(options, &self.resolver, self.fs.as_ref());
        let entries = session.load_graph().await?;
        session.detect_entry_exports(&entries).await?;
        session.emit(&entries).await
    }
}

/// State of a single `build` call
struct BuildSession<'a> {
    options: &'a BundleOptions,
    context: PluginContext,
    plugins: PluginManager,
    aliases: PathAliasResolver,
    resolver: &'a NodeModuleResolver,
    fs: &'a dyn FileSystemService,
    modules: Vec<ModuleInfo>,
    index: HashMap<String, usize>,
    warnings: Vec<String>,
}

/// Entry point after the graph walk
struct Entry {
    specifier: String,
    id: String,
    output_name: String,
}

impl<'a> BuildSession<'a> {
    fn new(
        options: &'a BundleOptions,
        resolver: &'a NodeModuleResolver,
        fs: &'a dyn FileSystemService,
    ) -> Self {
        let mode = options
            .define
            .get("process.env.NODE_ENV")
            .and_then(|v| serde_json::from_str::<String>(v).ok())
            .unwrap_or_else(|| "production".to_string());

        Self {
            options,
            context: PluginContext::new(options.root.clone(), options.absolute_outdir(), &mode),
            plugins: PluginManager::from_plugins(options.plugins.clone()),
            aliases: PathAliasResolver::new(options.alias.clone(), options.root.clone()),
            resolver,
            fs,
            modules: Vec::new(),
            index: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Plugins first, then the alias table, then Node-style resolution.
    async fn resolve(&self, specifier: &str, importer: Option<&Path>) -> Result<Resolved> {
        if self.is_external(specifier) {
            return Ok(Resolved::External);
        }

        if let Some(path) = self.plugins.resolve(specifier, importer, &self.context).await? {
            return Ok(Resolved::Module(path));
        }

        let root = &self.options.root;
        let resolution = match self.aliases.resolve(specifier) {
            Some(target) => {
                let target = target.to_string_lossy().to_string();
                self.resolver.resolve(&target, importer, root).await
            }
            None => self.resolver.resolve(specifier, importer, root).await,
        };

        Ok(match resolution {
            Some(Resolution::File(path)) => Resolved::Module(path),
            Some(Resolution::Empty) => Resolved::Empty,
            None => Resolved::Unresolved,
        })
    }

    fn is_external(&self, specifier: &str) -> bool {
        self.options.external.iter().any(|ext| {
            specifier == ext
                || specifier
                    .strip_prefix(ext.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Root-relative id with forward slashes
    fn module_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.options.root).unwrap_or(path);
        relative.to_string_lossy().replace('\\', "/")
    }

    /// Walk the graph breadth-first from the entry points. Returns the entries in order.
    async fn load_graph(&mut self) -> Result<Vec<Entry>> {
        let mut queue = VecDeque::new();
        let mut entries = Vec::new();

        for specifier in &self.options.entry_points {
            let (id, output_name) = match self.resolve(specifier, None).await? {
                Resolved::Module(path) => {
                    let id = self.module_id(&path);
                    queue.push_back((id.clone(), path.clone()));
                    (id, entry_output_name(specifier, &path))
                }
                Resolved::Empty => {
                    self.ensure_empty_module();
                    (EMPTY_MODULE_ID.to_string(), entry_output_name(specifier, Path::new(specifier)))
                }
                Resolved::External | Resolved::Unresolved => {
                    return Err(DevkitError::resolve(specifier, None));
                }
            };
            entries.push(Entry {
                specifier: specifier.clone(),
                id,
                output_name,
            });
        }

        while let Some((id, path)) = queue.pop_front() {
            if self.index.contains_key(&id) {
                continue;
            }

            let (mut module, specifiers) = self.load_module(&id, &path).await?;

            for specifier in specifiers {
                match self.resolve(&specifier, Some(&path)).await? {
                    Resolved::Module(dep_path) => {
                        let dep_id = self.module_id(&dep_path);
                        if !self.index.contains_key(&dep_id) {
                            queue.push_back((dep_id.clone(), dep_path));
                        }
                        module.dependencies.insert(specifier, dep_id);
                    }
                    Resolved::Empty => {
                        self.ensure_empty_module();
                        module.dependencies.insert(specifier, EMPTY_MODULE_ID.to_string());
                    }
                    Resolved::External => self.warnings.push(format!(
                        "\"{}\" is external and was left unbundled (imported by {})",
                        specifier, id
                    )),
                    Resolved::Unresolved => self
                        .warnings
                        .push(DevkitError::resolve(&specifier, Some(path.clone())).to_string()),
                }
            }

            module.star_exports = module
                .star_exports
                .iter()
                .filter_map(|spec| module.dependencies.get(spec).cloned())
                .collect();
            module.code = rewrite_requires(&module.code, &module.path, &module.dependencies)?;

            self.index.insert(id, self.modules.len());
            self.modules.push(module);
        }

        Ok(entries)
    }

    fn ensure_empty_module(&mut self) {
        if self.index.contains_key(EMPTY_MODULE_ID) {
            return;
        }
        self.index.insert(EMPTY_MODULE_ID.to_string(), self.modules.len());
        self.modules.push(ModuleInfo {
            id: EMPTY_MODULE_ID.to_string(),
            path: PathBuf::from(EMPTY_MODULE_ID),
            module_type: ModuleType::JavaScript,
            source: String::new(),
            code: String::new(),
            format: ModuleFormat::Cjs,
            dependencies: BTreeMap::new(),
            exports: Vec::new(),
            has_default_export: false,
            star_exports: Vec::new(),
        });
    }

    /// Read, transform and lower one module. Returns it with its raw import specifiers.
    async fn load_module(&mut self, id: &str, path: &Path) -> Result<(ModuleInfo, Vec<String>)> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let module_type = ModuleType::from_extension(ext);
        Logger::processing_file(id, &format!("{:?}", module_type));

        let source = self.fs.read_file(path).await?;
        let mut module = ModuleInfo {
            id: id.to_string(),
            path: path.to_path_buf(),
            module_type: module_type.clone(),
            source: source.clone(),
            code: String::new(),
            format: ModuleFormat::Cjs,
            dependencies: BTreeMap::new(),
            exports: Vec::new(),
            has_default_export: false,
            star_exports: Vec::new(),
        };

        match module_type {
            ModuleType::TypeScript => {
                return Err(DevkitError::build(format!(
                    "TypeScript sources are not supported: {}",
                    path.display()
                )));
            }
            ModuleType::Json => {
                let value: serde_json::Value = serde_json::from_str(&source)?;
                module.code = format!("module.exports = {};", value);
                return Ok((module, Vec::new()));
            }
            ModuleType::Css => {
                self.warnings
                    .push(format!("CSS file {} is not bundled; imported as an empty module", id));
                return Ok((module, Vec::new()));
            }
            ModuleType::Html | ModuleType::Unknown if !ext.is_empty() => {
                module.code = format!("module.exports = {};", serde_json::Value::String(source));
                return Ok((module, Vec::new()));
            }
            _ => {}
        }

        let transformed = self
            .plugins
            .transform(source, path, &self.context)
            .await?;
        let code = apply_defines(&transformed, path, &self.options.define)?;

        let allocator = Allocator::default();
        let program = parse_program(&allocator, &code, path)?;
        module.format = detect_module_format(&program, path);

        let specifiers = match module.format {
            ModuleFormat::Esm => {
                let lowered = lower_esm(&program, &code);
                module.code = lowered.code;
                module.exports = lowered.exports;
                module.has_default_export = lowered.has_default;
                module.star_exports = lowered.star_reexports;
                lowered.specifiers
            }
            ModuleFormat::Cjs => {
                module.code = code.clone();
                ModuleCalls::collect(&program).require_specifiers()
            }
        };

        Ok((module, specifiers))
    }

    /// Ask plugins for the named exports of CommonJS entries
    async fn detect_entry_exports(&mut self, entries: &[Entry]) -> Result<()> {
        for entry in entries {
            let Some(&idx) = self.index.get(&entry.id) else {
                continue;
            };
            if self.modules[idx].format != ModuleFormat::Cjs {
                continue;
            }

            let module = &self.modules[idx];
            let detected = self
                .plugins
                .detect_exports(&module.source, &module.path, &self.context)
                .await?;

            if let Some(names) = detected {
                self.modules[idx].exports = names.into_iter().filter(|n| n != "default").collect();
            }
        }
        Ok(())
    }

    /// Named exports of an ES module including everything reached through `export *`
    fn collect_named_exports(&self, id: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![id.to_string()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(&idx) = self.index.get(&current) else {
                continue;
            };
            let module = &self.modules[idx];
            for name in &module.exports {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            stack.extend(module.star_exports.iter().rev().cloned());
        }

        names
    }

    /// Module ids reachable from `id`, in graph order
    fn reachable(&self, id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(&idx) = self.index.get(&current) {
                stack.extend(self.modules[idx].dependencies.values().cloned());
            }
        }
        seen
    }

    async fn emit(&mut self, entries: &[Entry]) -> Result<BundleResult> {
        let outdir = self.options.absolute_outdir();
        self.fs.create_directory(&outdir).await?;

        let reachable: Vec<HashSet<String>> = entries.iter().map(|e| self.reachable(&e.id)).collect();

        let shared: HashSet<String> = if self.options.splitting && entries.len() >= 2 {
            let mut counts: HashMap<&String, usize> = HashMap::new();
            for set in &reachable {
                for id in set {
                    *counts.entry(id).or_default() += 1;
                }
            }
            counts
                .into_iter()
                .filter(|(_, count)| *count >= 2)
                .map(|(id, _)| id.clone())
                .collect()
        } else {
            HashSet::new()
        };
        let split = self.options.splitting && entries.len() >= 2;

        let mut result = BundleResult {
            modules_bundled: self.modules.len(),
            ..Default::default()
        };

        let chunk_name = if split {
            let modules: Vec<&ModuleInfo> = self.modules.iter().filter(|m| shared.contains(&m.id)).collect();
            let epilogue = format!("export {{ {} }};\n", RUNTIME_EXPORTS);
            let mut file = render_file(RUNTIME, &modules, &epilogue);

            let hash = blake3::hash(file.code.as_bytes()).to_hex();
            let name = format!("chunk-{}.js", hash[..8].to_uppercase());
            self.write_output(&outdir, &name, &mut file, &mut result).await?;
            Some(name)
        } else {
            None
        };

        for (entry, reach) in entries.iter().zip(&reachable) {
            let modules: Vec<&ModuleInfo> = self
                .modules
                .iter()
                .filter(|m| reach.contains(&m.id) && !shared.contains(&m.id))
                .collect();

            let preamble = match &chunk_name {
                Some(chunk) => format!(
                    "import {{ {} }} from \"{}{}\";\n",
                    RUNTIME_EXPORTS,
                    relative_prefix(&entry.output_name),
                    chunk
                ),
                None => RUNTIME.to_string(),
            };
            let epilogue = self.entry_epilogue(entry);

            let mut file = render_file(&preamble, &modules, &epilogue);
            let path = self
                .write_output(&outdir, &entry.output_name, &mut file, &mut result)
                .await?;
            result.entry_outputs.insert(entry.specifier.clone(), path);
        }

        result.warnings = std::mem::take(&mut self.warnings);
        Ok(result)
    }

    /// Code after the factories that exposes the entry module
    fn entry_epilogue(&self, entry: &Entry) -> String {
        let mut out = format!("const __entry = __require({});\n", js_string(&entry.id));

        if self.options.format == ModuleFormat::Cjs {
            out.push_str("module.exports = __entry;\n");
            return out;
        }

        let Some(&idx) = self.index.get(&entry.id) else {
            return out;
        };
        let module = &self.modules[idx];

        let names = match module.format {
            ModuleFormat::Esm => {
                if module.has_default_export {
                    out.push_str("export default __entry.default;\n");
                }
                self.collect_named_exports(&entry.id)
            }
            ModuleFormat::Cjs => {
                out.push_str("export default __toDefault(__entry);\n");
                module.exports.clone()
            }
        };

        if !names.is_empty() {
            let fields = names
                .iter()
                .enumerate()
                .map(|(i, name)| format!("{}: __e{}", js_property(name), i))
                .collect::<Vec<_>>()
                .join(", ");
            let specifiers = names
                .iter()
                .enumerate()
                .map(|(i, name)| format!("__e{} as {}", i, js_property(name)))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("const {{ {} }} = __entry;\n", fields));
            out.push_str(&format!("export {{ {} }};\n", specifiers));
        }

        out
    }

    async fn write_output(
        &self,
        outdir: &Path,
        name: &str,
        file: &mut RenderedFile,
        result: &mut BundleResult,
    ) -> Result<PathBuf> {
        let path = outdir.join(name);

        if self.options.sourcemap {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| name.to_string());
            let map_name = format!("{}.map", file_name);
            let map = file.source_map.build(&file_name).to_json()?;
            file.code.push_str(&source_mapping_url(&map_name));
            file.code.push('\n');

            let map_path = outdir.join(format!("{}.map", name));
            self.fs.write_file(&map_path, &map).await?;
            result.output_files.push(OutputFile::new(map_path, map));
        }

        self.fs.write_file(&path, &file.code).await?;
        result
            .output_files
            .push(OutputFile::new(path.clone(), std::mem::take(&mut file.code)));
        Ok(path)
    }
}

struct RenderedFile {
    code: String,
    source_map: SourceMapBuilder,
}

/// Concatenate preamble, module factories and epilogue, tracking line mappings.
fn render_file(preamble: &str, modules: &[&ModuleInfo], epilogue: &str) -> RenderedFile {
    let factories: Vec<String> = modules.par_iter().map(|m| render_factory(m)).collect();

    let mut code = String::with_capacity(
        preamble.len() + epilogue.len() + factories.iter().map(String::len).sum::<usize>(),
    );
    let mut source_map = SourceMapBuilder::new();
    let mut line = preamble.matches('\n').count() as u32;
    code.push_str(preamble);

    for (module, factory) in modules.iter().zip(&factories) {
        let source_index = source_map.add_source(&module.id, &module.source);
        let body_lines = module.code.lines().count().min(module.source.lines().count());
        for original in 0..body_lines as u32 {
            source_map.add_line_mapping(line + 1 + original, source_index, original);
        }

        line += factory.matches('\n').count() as u32;
        code.push_str(factory);
    }

    code.push_str(epilogue);
    RenderedFile { code, source_map }
}

fn render_factory(module: &ModuleInfo) -> String {
    format!(
        "__define({}, function (module, exports, require) {{\n{}\n}});\n",
        js_string(&module.id),
        module.code
    )
}

/// `.mjs` and `.cjs` decide by extension, anything else by its syntax
pub fn detect_module_format(program: &Program, path: &Path) -> ModuleFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mjs") => ModuleFormat::Esm,
        Some("cjs") => ModuleFormat::Cjs,
        _ if is_esm(program) => ModuleFormat::Esm,
        _ => ModuleFormat::Cjs,
    }
}

/// `<outdir>/<name>`: bare identifiers keep their name, files use their stem
pub fn entry_output_name(specifier: &str, resolved: &Path) -> String {
    if NodeModuleResolver::is_bare_specifier(specifier) {
        if specifier.ends_with(".js") {
            specifier.to_string()
        } else {
            format!("{}.js", specifier)
        }
    } else {
        let stem = resolved
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "index".to_string());
        format!("{}.js", stem)
    }
}

/// `./` or one `../` per directory level of `output_name`
fn relative_prefix(output_name: &str) -> String {
    match output_name.matches('/').count() {
        0 => "./".to_string(),
        depth => "../".repeat(depth),
    }
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn js_property(name: &str) -> String {
    let mut chars = name.chars();
    let is_ident = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if is_ident {
        name.to_string()
    } else {
        js_string(name)
    }
}
