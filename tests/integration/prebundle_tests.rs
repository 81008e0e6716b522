use crate::write;
use async_trait::async_trait;
use devkit::core::interfaces::Bundler;
use devkit::core::models::{BundleOptions, BundleResult};
use devkit::core::plugin::{Plugin, PluginContext};
use devkit::plugins::{PrebundleModulesPlugin, PREBUNDLED_MODULES_DIR};
use devkit::utils::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

#[derive(Default)]
struct RecordingBundler {
    calls: Mutex<Vec<BundleOptions>>,
}

#[async_trait]
impl Bundler for RecordingBundler {
    fn name(&self) -> &str {
        "recording"
    }

    async fn build(&self, options: &BundleOptions) -> Result<BundleResult> {
        self.calls.lock().push(options.clone());
        Ok(BundleResult::default())
    }
}

fn context(root: &Path) -> PluginContext {
    PluginContext::new(root.to_path_buf(), root.join("dist"), "development")
}

fn env(mode: &str) -> HashMap<String, String> {
    HashMap::from([("NODE_ENV".to_string(), mode.to_string())])
}

#[tokio::test]
async fn test_empty_project_still_invokes_bundler_once() {
    let temp = tempdir().unwrap();
    let bundler = Arc::new(RecordingBundler::default());
    let plugin = PrebundleModulesPlugin::new(env("development")).with_bundler(bundler.clone());

    plugin.on_build_start(&context(temp.path())).await.unwrap();

    let calls = bundler.calls.lock();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].entry_points.is_empty());
    assert_eq!(calls[0].outdir, Path::new(PREBUNDLED_MODULES_DIR));
    assert_eq!(
        calls[0].define.get("process.env.NODE_ENV").map(String::as_str),
        Some("\"development\"")
    );
    assert!(plugin.module_paths().is_empty());
}

#[tokio::test]
async fn test_installed_candidate_resolves_to_prebundled_file() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write(root, "node_modules/tocbot/package.json", r#"{"main":"index.js"}"#);
    write(root, "node_modules/tocbot/index.js", "exports.init = function () {};");

    let plugin = PrebundleModulesPlugin::new(env("development"))
        .with_bundler(Arc::new(RecordingBundler::default()));
    let ctx = context(root);
    plugin.on_build_start(&ctx).await.unwrap();

    let resolved = plugin.resolve("tocbot", None, &ctx).await.unwrap().unwrap();
    assert!(resolved.ends_with(".prebundled_modules/tocbot.js"));
    assert_eq!(plugin.resolve("react", None, &ctx).await.unwrap(), None);
    assert_eq!(plugin.resolve("./local.js", None, &ctx).await.unwrap(), None);
}

#[tokio::test]
async fn test_prebundle_with_native_bundler_writes_esm() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write(root, "node_modules/react/package.json", r#"{"main":"index.js"}"#);
    write(
        root,
        "node_modules/react/index.js",
        "if (process.env.NODE_ENV === 'production') {\n  module.exports = require('./cjs/react.production.js');\n} else {\n  module.exports = require('./cjs/react.development.js');\n}",
    );
    write(
        root,
        "node_modules/react/cjs/react.production.js",
        "exports.createElement = function () { return 'prod'; };",
    );
    write(
        root,
        "node_modules/react/cjs/react.development.js",
        "exports.createElement = function () { return 'dev'; };",
    );

    let plugin = PrebundleModulesPlugin::new(env("development"))
        .with_candidates(vec!["react".to_string(), "lit".to_string()]);
    plugin.on_build_start(&context(root)).await.unwrap();

    let output = root.join(PREBUNDLED_MODULES_DIR).join("react.js");
    let code = std::fs::read_to_string(&output).unwrap();

    assert!(code.contains("\"development\" === 'production'"));
    assert!(code.contains("export default __toDefault(__entry);"));
    assert!(code.contains("__e0 as createElement"));
    assert!(root.join(PREBUNDLED_MODULES_DIR).join("react.js.map").exists());
    assert_eq!(plugin.module_paths().len(), 1);
}
