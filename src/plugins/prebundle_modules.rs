// Prebundle plugin: bundles heavy dependencies once so the host build can resolve them pre-built

use crate::core::interfaces::Bundler;
use crate::core::models::{BundleOptions, ModuleFormat};
use crate::core::plugin::{Plugin, PluginContext};
use crate::infrastructure::{CommonJsPlugin, NativeBundler, NodeModuleResolver};
use crate::utils::{stringify_process_envs, Logger, Result, Timer};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Output directory for pre-bundled modules, relative to the project root
pub const PREBUNDLED_MODULES_DIR: &str = "node_modules/.prebundled_modules";

/// Modules worth pre-bundling when installed, in bundling order
pub const CANDIDATES: &[&str] = &[
    "@testing-library/dom",
    "@testing-library/user-event",
    "doctrine",
    "jest-mock",
    "lodash/mapValues.js",
    "tiny-invariant",
    "react-dom",
    "react",
    "memoizerific",
    "lodash/uniq.js",
    "lodash/pickBy.js",
    "lodash/cloneDeep.js",
    "lodash/throttle.js",
    "color-convert",
    "tocbot",
    "@storybook/blocks",
];

/// Node built-ins and Node-flavoured packages swapped for browser builds
const BROWSER_SHIMS: &[(&str, &str)] = &[
    ("assert", "browser-assert"),
    ("lodash", "lodash-es"),
    ("path", "path-browserify"),
];

/// Pre-bundles the installed candidates at build start and answers resolve
/// requests for them with the pre-built files.
pub struct PrebundleModulesPlugin {
    env: HashMap<String, String>,
    candidates: Vec<String>,
    bundler: Arc<dyn Bundler>,
    resolver: NodeModuleResolver,
    module_paths: RwLock<HashMap<String, PathBuf>>,
}

impl PrebundleModulesPlugin {
    pub fn new(env: HashMap<String, String>) -> Self {
        Self {
            env,
            candidates: CANDIDATES.iter().map(|c| c.to_string()).collect(),
            bundler: Arc::new(NativeBundler::new()),
            resolver: NodeModuleResolver::new(),
            module_paths: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = bundler;
        self
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Snapshot of identifier → pre-bundled file from the last build start
    pub fn module_paths(&self) -> HashMap<String, PathBuf> {
        self.module_paths.read().clone()
    }

    /// Where the bundler writes `module`
    pub fn output_path(root: &Path, module: &str) -> PathBuf {
        let file = if module.ends_with(".js") {
            module.to_string()
        } else {
            format!("{}.js", module)
        };
        root.join(PREBUNDLED_MODULES_DIR).join(file)
    }

    /// Candidates that resolve from `root`, in candidate order
    pub async fn available_modules(&self, root: &Path) -> Vec<String> {
        let mut available = Vec::new();
        for candidate in &self.candidates {
            if self.resolver.is_resolvable(candidate, root).await {
                available.push(candidate.clone());
            } else {
                Logger::candidate_skipped(candidate);
            }
        }
        available
    }

    /// Alias table for the pre-bundle build. Shims that are not installed are left out.
    async fn browser_aliases(&self, root: &Path) -> BTreeMap<String, String> {
        let mut aliases = BTreeMap::new();

        for (from, shim) in BROWSER_SHIMS {
            // lodash maps onto the whole lodash-es directory so subpaths keep working
            let target = if *from == "lodash" {
                self.resolver.package_dir(shim, root)
            } else {
                self.resolver
                    .resolve(shim, None, root)
                    .await
                    .and_then(|resolution| resolution.into_path())
            };

            match target {
                Some(target) => {
                    aliases.insert(from.to_string(), target.to_string_lossy().to_string());
                }
                None => Logger::warn(&format!(
                    "Browser shim '{}' for '{}' is not installed; alias skipped",
                    shim, from
                )),
            }
        }

        aliases
    }
}

#[async_trait]
impl Plugin for PrebundleModulesPlugin {
    fn name(&self) -> &str {
        "prebundle-modules"
    }

    async fn on_build_start(&self, context: &PluginContext) -> Result<()> {
        let timer = Timer::start("Pre-bundle modules");
        let root = &context.root;

        let available = self.available_modules(root).await;
        {
            let mut module_paths = self.module_paths.write();
            module_paths.clear();
            for module in &available {
                module_paths.insert(module.clone(), Self::output_path(root, module));
            }
        }

        Logger::prebundle_start(available.len(), self.candidates.len());

        let mut options = BundleOptions::new(root.clone());
        options.entry_points = available;
        options.outdir = PathBuf::from(PREBUNDLED_MODULES_DIR);
        options.bundle = true;
        options.format = ModuleFormat::Esm;
        options.splitting = true;
        options.sourcemap = true;
        options.alias = self.browser_aliases(root).await;
        options.define = stringify_process_envs(&self.env);
        options.plugins = vec![Arc::new(CommonJsPlugin::new())];

        let result = self.bundler.build(&options).await?;

        for warning in &result.warnings {
            Logger::debug(warning);
        }
        Logger::bundle_complete(
            result.entry_outputs.len(),
            result.modules_bundled,
            &options.absolute_outdir(),
            timer.elapsed(),
        );

        Ok(())
    }

    async fn resolve(
        &self,
        import_path: &str,
        _importer: Option<&Path>,
        _context: &PluginContext,
    ) -> Result<Option<PathBuf>> {
        Ok(self.module_paths.read().get(import_path).cloned())
    }
}
