use crate::core::{interfaces::*, models::*, plugin::{Plugin, PluginContext, PluginManager}};
use crate::utils::{Logger, Result, Timer};
use async_trait::async_trait;
use std::sync::Arc;

/// Host build pipeline: plugin lifecycle around a single bundler call
pub struct DevkitBuildService {
    bundler: Arc<dyn Bundler>,
    plugin_manager: PluginManager,
}

impl DevkitBuildService {
    pub fn new(bundler: Arc<dyn Bundler>) -> Self {
        Self {
            bundler,
            plugin_manager: PluginManager::new(),
        }
    }

    /// Register a plugin with the build service
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugin_manager.register(plugin);
        self
    }

    pub fn plugin_manager(&self) -> &PluginManager {
        &self.plugin_manager
    }

    fn bundle_options(&self, config: &BuildConfig) -> BundleOptions {
        BundleOptions {
            root: config.root.clone(),
            entry_points: config.entries.clone(),
            outdir: config.outdir.clone(),
            bundle: true,
            format: config.format,
            splitting: config.enable_code_splitting,
            sourcemap: config.enable_source_maps,
            alias: config.alias.clone(),
            define: config.define.clone(),
            external: config.external.clone(),
            plugins: self.plugin_manager.plugins().to_vec(),
        }
    }
}

#[async_trait]
impl BuildService for DevkitBuildService {
    async fn build(&self, config: &BuildConfig) -> Result<BuildResult> {
        let timer = Timer::start("Build");
        let options = self.bundle_options(config);
        let outdir = options.absolute_outdir();

        Logger::build_start(&config.root, &outdir);

        let context = PluginContext::new(config.root.clone(), outdir.clone(), &config.mode);
        self.plugin_manager.on_build_start(&context).await?;

        let bundle = self.bundler.build(&options).await?;
        let entries = bundle.entry_outputs.len();
        for warning in &bundle.warnings {
            Logger::warn(warning);
        }

        let result = BuildResult::from_bundle(bundle, timer.elapsed());
        self.plugin_manager.on_build_end(&context, &result).await?;

        Logger::bundle_complete(entries, result.modules_bundled, &outdir, result.build_time);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    #[derive(Default)]
    struct RecordingBundler {
        calls: Mutex<Vec<BundleOptions>>,
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Bundler for RecordingBundler {
        fn name(&self) -> &str {
            "recording"
        }

        async fn build(&self, options: &BundleOptions) -> Result<BundleResult> {
            self.events.lock().push("bundle".to_string());
            self.calls.lock().push(options.clone());
            Ok(BundleResult {
                modules_bundled: options.entry_points.len(),
                ..Default::default()
            })
        }
    }

    struct LifecyclePlugin {
        name: &'static str,
        events: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Plugin for LifecyclePlugin {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_build_start(&self, _context: &PluginContext) -> Result<()> {
            self.events.lock().push(format!("start:{}", self.name));
            if self.fail {
                return Err(crate::utils::DevkitError::build("start failed".to_string()));
            }
            Ok(())
        }

        async fn on_build_end(&self, _context: &PluginContext, result: &BuildResult) -> Result<()> {
            self.events
                .lock()
                .push(format!("end:{}:{}", self.name, result.modules_bundled));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lifecycle_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let bundler = Arc::new(RecordingBundler {
            events: events.clone(),
            ..Default::default()
        });

        let service = DevkitBuildService::new(bundler.clone())
            .with_plugin(Arc::new(LifecyclePlugin { name: "a", events: events.clone(), fail: false }))
            .with_plugin(Arc::new(LifecyclePlugin { name: "b", events: events.clone(), fail: false }));

        let config = BuildConfig {
            root: PathBuf::from("/app"),
            entries: vec!["src/main.js".to_string()],
            ..Default::default()
        };
        let result = service.build(&config).await.unwrap();

        assert!(result.success);
        assert_eq!(
            *events.lock(),
            vec!["start:a", "start:b", "bundle", "end:a:1", "end:b:1"]
        );

        let calls = bundler.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].plugins.len(), 2);
        assert_eq!(calls[0].entry_points, vec!["src/main.js".to_string()]);
    }

    #[tokio::test]
    async fn test_build_start_error_aborts() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let bundler = Arc::new(RecordingBundler {
            events: events.clone(),
            ..Default::default()
        });

        let service = DevkitBuildService::new(bundler.clone())
            .with_plugin(Arc::new(LifecyclePlugin { name: "a", events: events.clone(), fail: true }))
            .with_plugin(Arc::new(LifecyclePlugin { name: "b", events: events.clone(), fail: false }));

        let err = service.build(&BuildConfig::default()).await.unwrap_err();

        assert!(err.to_string().contains("start failed"));
        assert_eq!(*events.lock(), vec!["start:a"]);
        assert!(bundler.calls.lock().is_empty());
    }
}
