// Build plugin contract
// Plugins hook into the build lifecycle and into module resolution/loading

use crate::core::models::BuildResult;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Context provided to plugins during execution
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Project root directory; relative lookups start here
    pub root: PathBuf,
    /// Output directory of the current build
    pub outdir: PathBuf,
    /// "development" or "production"
    pub mode: String,
}

impl PluginContext {
    pub fn new(root: PathBuf, outdir: PathBuf, mode: &str) -> Self {
        Self {
            root,
            outdir,
            mode: mode.to_string(),
        }
    }
}

/// Main plugin trait that all plugins must implement
///
/// Plugins can hook into various stages of the build process:
/// - Build lifecycle (start/end), called by the host pipeline
/// - Module resolution (resolve), called by bundlers
/// - Module loading (transform, detect_exports), called by bundlers
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique name for this plugin
    fn name(&self) -> &str;

    /// Called once at the start of a build, before any module is resolved.
    ///
    /// An error aborts the build.
    async fn on_build_start(&self, _context: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Called after the bundler finished
    async fn on_build_end(&self, _context: &PluginContext, _result: &BuildResult) -> Result<()> {
        Ok(())
    }

    /// Resolve module imports
    ///
    /// Return Some(resolved_path) to override resolution,
    /// or None to defer to the next plugin and then to default resolution.
    ///
    /// # Arguments
    /// * `import` - Import specifier (e.g., "./utils", "lodash")
    /// * `importer` - File doing the import, `None` for entry points
    /// * `context` - Plugin context with build information
    async fn resolve(
        &self,
        _import: &str,
        _importer: Option<&Path>,
        _context: &PluginContext,
    ) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    /// Transform file content
    ///
    /// Return Some(transformed_code) to replace the content,
    /// or None to leave it unchanged.
    async fn transform(
        &self,
        _code: &str,
        _file_path: &Path,
        _context: &PluginContext,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    /// Report the named exports of a module the bundler cannot analyse
    /// statically (CommonJS). First `Some` wins.
    async fn detect_exports(
        &self,
        _code: &str,
        _file_path: &Path,
        _context: &PluginContext,
    ) -> Result<Option<Vec<String>>> {
        Ok(None)
    }
}

/// Manages plugin registration and execution
#[derive(Clone, Default)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_plugins(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// Register a plugin
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    /// Execute on_build_start hook for all plugins, in registration order
    pub async fn on_build_start(&self, context: &PluginContext) -> Result<()> {
        for plugin in &self.plugins {
            plugin.on_build_start(context).await?;
        }
        Ok(())
    }

    pub async fn on_build_end(&self, context: &PluginContext, result: &BuildResult) -> Result<()> {
        for plugin in &self.plugins {
            plugin.on_build_end(context, result).await?;
        }
        Ok(())
    }

    /// Execute transform hooks for all plugins
    ///
    /// Each plugin receives the output of the previous plugin.
    pub async fn transform(
        &self,
        mut code: String,
        file_path: &Path,
        context: &PluginContext,
    ) -> Result<String> {
        for plugin in &self.plugins {
            if let Some(transformed) = plugin.transform(&code, file_path, context).await? {
                code = transformed;
            }
        }
        Ok(code)
    }

    /// Returns the first non-None result, or None if no plugin resolved it.
    pub async fn resolve(
        &self,
        import: &str,
        importer: Option<&Path>,
        context: &PluginContext,
    ) -> Result<Option<PathBuf>> {
        for plugin in &self.plugins {
            if let Some(resolved) = plugin.resolve(import, importer, context).await? {
                return Ok(Some(resolved));
            }
        }
        Ok(None)
    }

    pub async fn detect_exports(
        &self,
        code: &str,
        file_path: &Path,
        context: &PluginContext,
    ) -> Result<Option<Vec<String>>> {
        for plugin in &self.plugins {
            if let Some(exports) = plugin.detect_exports(code, file_path, context).await? {
                return Ok(Some(exports));
            }
        }
        Ok(None)
    }
}
