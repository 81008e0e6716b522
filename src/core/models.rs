use crate::core::plugin::Plugin;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Output module format of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    #[default]
    Esm,
    Cjs,
}

impl ModuleFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleFormat::Esm => "esm",
            ModuleFormat::Cjs => "cjs",
        }
    }
}

impl std::fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModuleFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "esm" => Ok(ModuleFormat::Esm),
            "cjs" => Ok(ModuleFormat::Cjs),
            other => Err(format!("unknown module format: {}", other)),
        }
    }
}

/// Input of a single bundler invocation.
///
/// `outdir` is relative to `root` unless absolute. `plugins` act as resolvers,
/// transformers and export detectors while the graph is walked; their
/// lifecycle hooks are never called by a bundler.
#[derive(Clone)]
pub struct BundleOptions {
    pub root: PathBuf,
    pub entry_points: Vec<String>,
    pub outdir: PathBuf,
    pub bundle: bool,
    pub format: ModuleFormat,
    pub splitting: bool,
    pub sourcemap: bool,
    pub alias: BTreeMap<String, String>,
    pub define: BTreeMap<String, String>,
    pub external: Vec<String>,
    pub plugins: Vec<Arc<dyn Plugin>>,
}

impl BundleOptions {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            entry_points: Vec::new(),
            outdir: PathBuf::from("dist"),
            bundle: true,
            format: ModuleFormat::Esm,
            splitting: false,
            sourcemap: false,
            alias: BTreeMap::new(),
            define: BTreeMap::new(),
            external: Vec::new(),
            plugins: Vec::new(),
        }
    }

    /// `outdir` resolved against `root`.
    pub fn absolute_outdir(&self) -> PathBuf {
        if self.outdir.is_absolute() {
            self.outdir.clone()
        } else {
            self.root.join(&self.outdir)
        }
    }
}

impl std::fmt::Debug for BundleOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleOptions")
            .field("root", &self.root)
            .field("entry_points", &self.entry_points)
            .field("outdir", &self.outdir)
            .field("bundle", &self.bundle)
            .field("format", &self.format)
            .field("splitting", &self.splitting)
            .field("sourcemap", &self.sourcemap)
            .field("alias", &self.alias)
            .field("define", &self.define)
            .field("external", &self.external)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Debug, Default, Clone)]
pub struct BundleResult {
    pub output_files: Vec<OutputFile>,
    /// Entry point as given → emitted file
    pub entry_outputs: BTreeMap<String, PathBuf>,
    pub warnings: Vec<String>,
    pub modules_bundled: usize,
}

#[derive(Debug, Clone)]
pub struct OutputFile {
    pub path: PathBuf,
    pub content: String,
    pub size: usize,
}

impl OutputFile {
    pub fn new(path: PathBuf, content: String) -> Self {
        let size = content.len();
        Self { path, content, size }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_outdir")]
    pub outdir: PathBuf,
    /// Entry specifiers: relative files or bare package identifiers
    #[serde(default)]
    pub entries: Vec<String>,
    #[serde(default)]
    pub format: ModuleFormat,
    #[serde(default)]
    pub enable_source_maps: bool,
    #[serde(default)]
    pub enable_code_splitting: bool,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub alias: BTreeMap<String, String>,
    #[serde(default)]
    pub define: BTreeMap<String, String>,
    #[serde(default)]
    pub external: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_outdir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_mode() -> String {
    "production".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            outdir: default_outdir(),
            entries: Vec::new(),
            format: ModuleFormat::Esm,
            enable_source_maps: false,
            enable_code_splitting: false,
            mode: default_mode(),
            alias: BTreeMap::new(),
            define: BTreeMap::new(),
            external: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct BuildResult {
    pub success: bool,
    pub output_files: Vec<OutputFile>,
    pub modules_bundled: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub build_time: Duration,
}

impl BuildResult {
    pub fn from_bundle(bundle: BundleResult, build_time: Duration) -> Self {
        Self {
            success: true,
            output_files: bundle.output_files,
            modules_bundled: bundle.modules_bundled,
            warnings: bundle.warnings,
            errors: Vec::new(),
            build_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    JavaScript,
    TypeScript,
    Css,
    Html,
    Json,
    Unknown,
}

impl ModuleType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "jsx" | "mjs" | "cjs" => ModuleType::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => ModuleType::TypeScript,
            "css" => ModuleType::Css,
            "html" | "htm" => ModuleType::Html,
            "json" => ModuleType::Json,
            _ => ModuleType::Unknown,
        }
    }
}

/// One module of a bundle graph after loading and lowering.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// Root-relative id used as the registry key
    pub id: String,
    pub path: PathBuf,
    pub module_type: ModuleType,
    /// Original source, kept for source maps
    pub source: String,
    /// Registry-form code
    pub code: String,
    pub format: ModuleFormat,
    /// Import specifier → resolved module id
    pub dependencies: BTreeMap<String, String>,
    pub exports: Vec<String>,
    pub has_default_export: bool,
    /// Resolved ids of `export * from` targets
    pub star_exports: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_format_parse() {
        assert_eq!("esm".parse::<ModuleFormat>().unwrap(), ModuleFormat::Esm);
        assert_eq!("cjs".parse::<ModuleFormat>().unwrap(), ModuleFormat::Cjs);
        assert!("iife".parse::<ModuleFormat>().is_err());
    }

    #[test]
    fn test_build_config_from_json() {
        let config: BuildConfig =
            serde_json::from_str(r#"{"entries": ["src/main.js"], "enableSourceMaps": true}"#).unwrap();

        assert_eq!(config.entries, vec!["src/main.js".to_string()]);
        assert!(config.enable_source_maps);
        assert_eq!(config.outdir, PathBuf::from("dist"));
        assert_eq!(config.mode, "production");
    }

    #[test]
    fn test_absolute_outdir() {
        let mut options = BundleOptions::new(PathBuf::from("/app"));
        options.outdir = PathBuf::from("node_modules/.prebundled_modules");
        assert_eq!(
            options.absolute_outdir(),
            PathBuf::from("/app/node_modules/.prebundled_modules")
        );

        options.outdir = PathBuf::from("/tmp/out");
        assert_eq!(options.absolute_outdir(), PathBuf::from("/tmp/out"));
    }
}
