use crate::utils::Logger;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Export conditions of a browser bundle, most preferred first
const BROWSER_CONDITIONS: &[&str] = &["browser", "import", "module", "default", "require"];

/// Export conditions of Node's `require.resolve`
const REQUIRE_CONDITIONS: &[&str] = &["require", "node", "default"];

/// Extensions tried when a specifier names a file without one
const EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".jsx", ".json"];

/// Package.json fields relevant to resolution
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub browser: Option<BrowserField>,
    #[serde(default)]
    pub exports: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BrowserField {
    String(String),
    Object(HashMap<String, Value>),
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    File(PathBuf),
    /// Mapped to `false` by a `browser` field: an empty module
    Empty,
}

impl Resolution {
    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            Resolution::File(path) => Some(path),
            Resolution::Empty => None,
        }
    }
}

/// Which package fields and export conditions apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// `browser`, `module` and `main` fields with browser conditions
    Browser,
    /// `main` only with `require` conditions, like `require.resolve`
    Require,
}

impl ResolveMode {
    fn conditions(self) -> &'static [&'static str] {
        match self {
            ResolveMode::Browser => BROWSER_CONDITIONS,
            ResolveMode::Require => REQUIRE_CONDITIONS,
        }
    }
}

/// Node.js-style module resolution implementation
#[derive(Default)]
pub struct NodeModuleResolver {
    /// Cache of package.json files
    package_cache: DashMap<PathBuf, Arc<PackageJson>>,
}

impl NodeModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a module import following the Node.js resolution algorithm.
    ///
    /// Relative specifiers are resolved from the importer's directory, or from
    /// `root` when there is no importer.
    pub async fn resolve(
        &self,
        specifier: &str,
        importer: Option<&Path>,
        root: &Path,
    ) -> Option<Resolution> {
        let base_dir = importer
            .and_then(|p| p.parent())
            .unwrap_or(root)
            .to_path_buf();

        if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".." {
            let resolved = self.resolve_file_or_directory(&normalize_path(&base_dir.join(specifier))).await?;
            return Some(self.apply_browser_file_map(resolved).await);
        }

        if Path::new(specifier).is_absolute() {
            return self
                .resolve_file_or_directory(&normalize_path(Path::new(specifier)))
                .await
                .map(Resolution::File);
        }

        // A package may remap or stub bare specifiers for its own files
        if let Some(importer) = importer {
            if let Some(mapped) = self.browser_specifier_override(specifier, importer).await {
                return Some(mapped);
            }
        }

        self.resolve_node_module(specifier, &base_dir, ResolveMode::Browser).await
    }

    /// Whether `specifier` is installed under `root`, resolved the way
    /// `require.resolve` would
    pub async fn is_resolvable(&self, specifier: &str, root: &Path) -> bool {
        if Self::is_bare_specifier(specifier) {
            self.resolve_node_module(specifier, root, ResolveMode::Require)
                .await
                .is_some()
        } else {
            self.resolve(specifier, None, root).await.is_some()
        }
    }

    /// Locate the installed directory of a package, walking up from `root`
    pub fn package_dir(&self, package_name: &str, root: &Path) -> Option<PathBuf> {
        root.ancestors()
            .map(|dir| dir.join("node_modules").join(package_name))
            .find(|candidate| candidate.is_dir())
    }

    async fn resolve_node_module(
        &self,
        specifier: &str,
        base_dir: &Path,
        mode: ResolveMode,
    ) -> Option<Resolution> {
        let (pkg_name, subpath) = parse_package_specifier(specifier);
        Logger::resolving_module(specifier);

        for dir in base_dir.ancestors() {
            let package_dir = dir.join("node_modules").join(&pkg_name);
            if !package_dir.is_dir() {
                continue;
            }

            if let Some(resolved) = self
                .resolve_package_entry(&package_dir, subpath.as_deref(), mode)
                .await
            {
                return Some(resolved);
            }
        }

        None
    }

    /// Resolve the entry (or a subpath) of an installed package
    async fn resolve_package_entry(
        &self,
        package_dir: &Path,
        subpath: Option<&str>,
        mode: ResolveMode,
    ) -> Option<Resolution> {
        let package_json = self.read_package_json(&package_dir.join("package.json")).await;

        // 1. exports field takes precedence over everything else
        if let Some(exports) = package_json.as_ref().and_then(|p| p.exports.as_ref()) {
            let key = match subpath {
                Some(sub) => format!("./{}", sub),
                None => ".".to_string(),
            };
            if let Some(target) = resolve_exports(exports, &key, mode.conditions()) {
                let file = normalize_path(&package_dir.join(target));
                return file.is_file().then_some(Resolution::File(file));
            }
        }

        if let Some(subpath) = subpath {
            let resolved = self
                .resolve_file_or_directory(&package_dir.join(subpath))
                .await?;
            return Some(self.finish(resolved, mode).await);
        }

        let package_json = package_json.unwrap_or_default();

        // 2. browser field as a string replaces the entry point
        if let (ResolveMode::Browser, Some(BrowserField::String(browser))) = (mode, &package_json.browser) {
            if let Some(resolved) = self.resolve_as_file_or_index(&package_dir.join(browser)) {
                return Some(Resolution::File(resolved));
            }
        }

        // 3. module (browser only), 4. main, 5. index
        let module = package_json.module.as_deref().filter(|_| mode == ResolveMode::Browser);
        for entry in [module, package_json.main.as_deref()].into_iter().flatten() {
            if let Some(resolved) = self.resolve_as_file_or_index(&normalize_path(&package_dir.join(entry))) {
                return Some(self.finish(resolved, mode).await);
            }
        }

        let resolved = self.resolve_as_file_or_index(&package_dir.join("index"))?;
        Some(self.finish(resolved, mode).await)
    }

    async fn finish(&self, file: PathBuf, mode: ResolveMode) -> Resolution {
        match mode {
            ResolveMode::Browser => self.apply_browser_file_map(file).await,
            ResolveMode::Require => Resolution::File(file),
        }
    }

    /// Try as file, then as directory (package.json main, index files)
    async fn resolve_file_or_directory(&self, path: &Path) -> Option<PathBuf> {
        if let Some(file) = resolve_as_file(path) {
            return Some(file);
        }

        if !path.is_dir() {
            return None;
        }

        if let Some(pkg) = self.read_package_json(&path.join("package.json")).await {
            if let Some(main) = pkg.module.as_ref().or(pkg.main.as_ref()) {
                if let Some(resolved) = self.resolve_as_file_or_index(&path.join(main)) {
                    return Some(resolved);
                }
            }
        }

        resolve_index(path)
    }

    fn resolve_as_file_or_index(&self, path: &Path) -> Option<PathBuf> {
        resolve_as_file(path).or_else(|| resolve_index(path))
    }

    /// Apply the enclosing package's `browser` object to a resolved file
    async fn apply_browser_file_map(&self, file: PathBuf) -> Resolution {
        let Some((package_dir, pkg)) = self.nearest_package(&file).await else {
            return Resolution::File(file);
        };
        let Some(BrowserField::Object(map)) = &pkg.browser else {
            return Resolution::File(file);
        };

        let Ok(relative) = file.strip_prefix(&package_dir) else {
            return Resolution::File(file);
        };
        let relative = format!("./{}", relative.to_string_lossy().replace('\\', "/"));
        let without_ext = relative
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .filter(|stem| stem.len() > 1);

        let keys = std::iter::once(relative.clone())
            .chain(without_ext)
            .chain(std::iter::once(relative.trim_start_matches("./").to_string()));

        for key in keys {
            match map.get(&key) {
                Some(Value::Bool(false)) => return Resolution::Empty,
                Some(Value::String(target)) => {
                    if let Some(resolved) = resolve_as_file(&normalize_path(&package_dir.join(target))) {
                        return Resolution::File(resolved);
                    }
                }
                _ => {}
            }
        }

        Resolution::File(file)
    }

    /// `browser: { "fs": false, "crypto": "./shim.js" }` for bare specifiers imported inside a package
    async fn browser_specifier_override(&self, specifier: &str, importer: &Path) -> Option<Resolution> {
        let (package_dir, pkg) = self.nearest_package(importer).await?;
        let Some(BrowserField::Object(map)) = &pkg.browser else {
            return None;
        };

        match map.get(specifier)? {
            Value::Bool(false) => Some(Resolution::Empty),
            Value::String(target) if target.starts_with('.') => resolve_as_file(
                &normalize_path(&package_dir.join(target)),
            )
            .map(Resolution::File),
            Value::String(target) => {
                self.resolve_node_module(target, &package_dir, ResolveMode::Browser)
                    .await
            }
            _ => None,
        }
    }

    /// The closest directory above `file` holding a package.json, with that package.json
    async fn nearest_package(&self, file: &Path) -> Option<(PathBuf, Arc<PackageJson>)> {
        for dir in file.parent()?.ancestors() {
            let manifest = dir.join("package.json");
            if manifest.is_file() {
                let pkg = self.read_package_json(&manifest).await?;
                return Some((dir.to_path_buf(), pkg));
            }
            if dir.file_name().is_some_and(|n| n == "node_modules") {
                break;
            }
        }
        None
    }

    /// Read and cache package.json
    async fn read_package_json(&self, path: &Path) -> Option<Arc<PackageJson>> {
        if let Some(cached) = self.package_cache.get(path) {
            return Some(cached.clone());
        }

        let content = tokio::fs::read_to_string(path).await.ok()?;
        let package: PackageJson = match serde_json::from_str(&content) {
            Ok(package) => package,
            Err(e) => {
                Logger::debug(&format!("Ignoring unreadable {}: {}", path.display(), e));
                return None;
            }
        };

        let package = Arc::new(package);
        self.package_cache.insert(path.to_path_buf(), package.clone());
        Some(package)
    }

    /// Check if a path is a node_modules import
    pub fn is_bare_specifier(import_path: &str) -> bool {
        !import_path.starts_with("./")
            && !import_path.starts_with("../")
            && !import_path.starts_with('/')
            && import_path != "."
            && import_path != ".."
    }
}

/// Split `@scope/pkg/sub/path` into (`@scope/pkg`, `sub/path`)
pub fn parse_package_specifier(specifier: &str) -> (String, Option<String>) {
    let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let name = if specifier.starts_with('@') {
        match (parts.next(), parts.next()) {
            (Some(scope), Some(pkg)) => format!("{}/{}", scope, pkg),
            (Some(scope), None) => scope.to_string(),
            _ => specifier.to_string(),
        }
    } else {
        parts.next().unwrap_or(specifier).to_string()
    };

    let subpath = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    (name, subpath)
}

/// Resolve a subpath (`.` or `./x`) against a package `exports` field
pub fn resolve_exports(exports: &Value, subpath: &str, conditions: &[&str]) -> Option<String> {
    let is_subpath_map = match exports {
        Value::Object(map) => map.keys().any(|k| k.starts_with('.')),
        _ => false,
    };

    if !is_subpath_map {
        return (subpath == ".")
            .then(|| resolve_conditions(exports, conditions))
            .flatten();
    }

    let Value::Object(map) = exports else {
        return None;
    };

    if let Some(target) = map.get(subpath) {
        return resolve_conditions(target, conditions);
    }

    // Single-wildcard patterns, longest prefix first
    let mut patterns: Vec<(&String, &Value)> = map.iter().filter(|(k, _)| k.contains('*')).collect();
    patterns.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    for (pattern, target) in patterns {
        let Some((prefix, suffix)) = pattern.split_once('*') else {
            continue;
        };
        if subpath.len() >= prefix.len() + suffix.len()
            && subpath.starts_with(prefix)
            && subpath.ends_with(suffix)
        {
            let matched = &subpath[prefix.len()..subpath.len() - suffix.len()];
            return resolve_conditions(target, conditions).map(|t| t.replace('*', matched));
        }
    }

    None
}

fn resolve_conditions(target: &Value, conditions: &[&str]) -> Option<String> {
    match target {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items
            .iter()
            .find_map(|item| resolve_conditions(item, conditions)),
        Value::Object(map) => conditions
            .iter()
            .filter_map(|condition| map.get(*condition))
            .find_map(|target| resolve_conditions(target, conditions)),
        _ => None,
    }
}

/// Try to resolve as a file, as-is or with one of the known extensions
fn resolve_as_file(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }

    let base = path.as_os_str().to_string_lossy();
    EXTENSIONS
        .iter()
        .map(|ext| PathBuf::from(format!("{}{}", base, ext)))
        .find(|candidate| candidate.is_file())
}

fn resolve_index(dir: &Path) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("index{}", ext)))
        .find(|candidate| candidate.is_file())
}

/// Lexically remove `.` and `..` components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parse_package_specifier() {
        assert_eq!(parse_package_specifier("react"), ("react".to_string(), None));
        assert_eq!(
            parse_package_specifier("lodash/uniq.js"),
            ("lodash".to_string(), Some("uniq.js".to_string()))
        );
        assert_eq!(
            parse_package_specifier("@testing-library/dom"),
            ("@testing-library/dom".to_string(), None)
        );
        assert_eq!(
            parse_package_specifier("@storybook/blocks/dist/index.js"),
            ("@storybook/blocks".to_string(), Some("dist/index.js".to_string()))
        );
    }

    #[test]
    fn test_resolve_exports() {
        assert_eq!(resolve_exports(&json!("./index.js"), ".", BROWSER_CONDITIONS), Some("./index.js".to_string()));
        assert_eq!(resolve_exports(&json!("./index.js"), "./sub", BROWSER_CONDITIONS), None);

        let exports = json!({
            ".": { "require": "./cjs/index.js", "import": "./esm/index.mjs" },
            "./features/*": "./dist/features/*.js",
            "./package.json": "./package.json"
        });
        assert_eq!(
            resolve_exports(&exports, ".", BROWSER_CONDITIONS),
            Some("./esm/index.mjs".to_string())
        );
        assert_eq!(
            resolve_exports(&exports, ".", REQUIRE_CONDITIONS),
            Some("./cjs/index.js".to_string())
        );
        assert_eq!(
            resolve_exports(&exports, "./features/a", BROWSER_CONDITIONS),
            Some("./dist/features/a.js".to_string())
        );
        assert_eq!(resolve_exports(&exports, "./missing", BROWSER_CONDITIONS), None);

        let conditions = json!({ "node": "./node.js", "default": "./browser.js" });
        assert_eq!(
            resolve_exports(&conditions, ".", BROWSER_CONDITIONS),
            Some("./browser.js".to_string())
        );
        assert_eq!(
            resolve_exports(&conditions, ".", REQUIRE_CONDITIONS),
            Some("./node.js".to_string())
        );
    }

    #[tokio::test]
    async fn test_resolve_main_and_module_fields() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(root, "node_modules/cjs-pkg/package.json", r#"{"name":"cjs-pkg","main":"lib/main"}"#);
        write(root, "node_modules/cjs-pkg/lib/main.js", "module.exports = 1;");
        write(
            root,
            "node_modules/esm-pkg/package.json",
            r#"{"name":"esm-pkg","main":"index.js","module":"esm/index.js"}"#,
        );
        write(root, "node_modules/esm-pkg/index.js", "");
        write(root, "node_modules/esm-pkg/esm/index.js", "");

        let resolver = NodeModuleResolver::new();

        assert_eq!(
            resolver.resolve("cjs-pkg", None, root).await,
            Some(Resolution::File(root.join("node_modules/cjs-pkg/lib/main.js")))
        );
        assert_eq!(
            resolver.resolve("esm-pkg", None, root).await,
            Some(Resolution::File(root.join("node_modules/esm-pkg/esm/index.js")))
        );
        assert!(resolver.resolve("missing-pkg", None, root).await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_scoped_and_subpath() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(root, "node_modules/@scope/pkg/index.js", "");
        write(root, "node_modules/lodash/uniq.js", "");

        let resolver = NodeModuleResolver::new();

        assert_eq!(
            resolver.resolve("@scope/pkg", None, root).await,
            Some(Resolution::File(root.join("node_modules/@scope/pkg/index.js")))
        );
        assert_eq!(
            resolver.resolve("lodash/uniq.js", None, root).await,
            Some(Resolution::File(root.join("node_modules/lodash/uniq.js")))
        );
        assert_eq!(
            resolver.resolve("lodash/uniq", None, root).await,
            Some(Resolution::File(root.join("node_modules/lodash/uniq.js")))
        );
        assert!(resolver.is_resolvable("lodash/uniq.js", root).await);
        assert!(!resolver.is_resolvable("lodash/pickBy.js", root).await);
    }

    #[tokio::test]
    async fn test_resolve_relative_from_nested_package() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(root, "node_modules/a/index.js", "require('b')");
        write(root, "node_modules/a/node_modules/b/index.js", "");
        write(root, "node_modules/a/util/helpers.js", "");

        let resolver = NodeModuleResolver::new();
        let importer = root.join("node_modules/a/index.js");

        assert_eq!(
            resolver.resolve("b", Some(&importer), root).await,
            Some(Resolution::File(root.join("node_modules/a/node_modules/b/index.js")))
        );
        assert_eq!(
            resolver.resolve("./util/helpers", Some(&importer), root).await,
            Some(Resolution::File(root.join("node_modules/a/util/helpers.js")))
        );
    }

    #[tokio::test]
    async fn test_browser_field() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(
            root,
            "node_modules/iso/package.json",
            r#"{"main":"./node.js","browser":{"./node.js":"./browser.js","fs":false}}"#,
        );
        write(root, "node_modules/iso/node.js", "require('fs')");
        write(root, "node_modules/iso/browser.js", "");
        write(root, "node_modules/str/package.json", r#"{"main":"main.js","browser":"web.js"}"#);
        write(root, "node_modules/str/main.js", "");
        write(root, "node_modules/str/web.js", "");

        let resolver = NodeModuleResolver::new();

        assert_eq!(
            resolver.resolve("iso", None, root).await,
            Some(Resolution::File(root.join("node_modules/iso/browser.js")))
        );
        assert_eq!(
            resolver
                .resolve("fs", Some(&root.join("node_modules/iso/node.js")), root)
                .await,
            Some(Resolution::Empty)
        );
        assert_eq!(
            resolver.resolve("str", None, root).await,
            Some(Resolution::File(root.join("node_modules/str/web.js")))
        );
    }

    #[tokio::test]
    async fn test_exports_field_wins() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(
            root,
            "node_modules/modern/package.json",
            r#"{"main":"old.js","exports":{".":{"import":"./esm.js","require":"./cjs.js"},"./utils":"./lib/utils.js"}}"#,
        );
        write(root, "node_modules/modern/old.js", "");
        write(root, "node_modules/modern/esm.js", "");
        write(root, "node_modules/modern/lib/utils.js", "");

        let resolver = NodeModuleResolver::new();

        assert_eq!(
            resolver.resolve("modern", None, root).await,
            Some(Resolution::File(root.join("node_modules/modern/esm.js")))
        );
        assert_eq!(
            resolver.resolve("modern/utils", None, root).await,
            Some(Resolution::File(root.join("node_modules/modern/lib/utils.js")))
        );
    }

    #[tokio::test]
    async fn test_is_resolvable_uses_require_conditions() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(
            root,
            "node_modules/esm-only/package.json",
            r#"{"exports":{".":{"import":"./index.mjs"}}}"#,
        );
        write(root, "node_modules/esm-only/index.mjs", "");
        write(
            root,
            "node_modules/dual/package.json",
            r#"{"exports":{".":{"import":"./index.mjs","require":"./index.cjs"}}}"#,
        );
        write(root, "node_modules/dual/index.cjs", "");
        write(root, "node_modules/module-only/package.json", r#"{"module":"esm.js"}"#);
        write(root, "node_modules/module-only/esm.js", "");

        let resolver = NodeModuleResolver::new();

        assert!(resolver.resolve("esm-only", None, root).await.is_some());
        assert!(!resolver.is_resolvable("esm-only", root).await);
        assert!(resolver.is_resolvable("dual", root).await);
        assert!(!resolver.is_resolvable("module-only", root).await);
    }

    #[test]
    fn test_package_dir() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("node_modules/lodash-es")).unwrap();

        let resolver = NodeModuleResolver::new();
        assert_eq!(
            resolver.package_dir("lodash-es", &root.join("src")),
            Some(root.join("node_modules/lodash-es"))
        );
        assert_eq!(resolver.package_dir("lodash", root), None);
    }
}
