use crate::core::{interfaces::*, plugin::PluginContext, services::*};
use crate::dev_server::{BuildPluginAdapter, DevServer, DevServerCoreConfig, TracingLogger};
use crate::infrastructure::{EsbuildBundler, NativeBundler};
use crate::plugins::{PrebundleModulesPlugin, PREBUNDLED_MODULES_DIR};
use crate::utils::{
    stringify_process_envs, BuildOverrides, BuildWatcher, BundlerKind, ConfigLoader,
    DevkitConfig, EnvVarsManager, Logger, Result, WatchConfig,
};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "devkit")]
#[command(about = "devkit - dev server and dependency pre-bundler for web projects")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start development server
    Dev {
        /// Root directory
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,
        /// Hostname to bind
        #[arg(long)]
        hostname: Option<String>,
        /// Skip pre-bundling dependencies
        #[arg(long)]
        no_prebundle: bool,
        /// Reload browsers when files change
        #[arg(long)]
        watch: bool,
        /// Mode used to pick .env files
        #[arg(long, default_value = "development")]
        mode: String,
    },
    /// Build for production
    Build {
        /// Root directory
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Entry points (files or package names)
        #[arg(short, long = "entry")]
        entries: Vec<String>,
        /// Output directory
        #[arg(short, long)]
        outdir: Option<String>,
        /// Enable source maps
        #[arg(long)]
        source_maps: bool,
        /// Split modules shared by several entries into a chunk
        #[arg(long)]
        splitting: bool,
        /// Rebuild on file changes
        #[arg(short, long)]
        watch: bool,
        /// Skip pre-bundling dependencies
        #[arg(long)]
        no_prebundle: bool,
        #[arg(long, default_value = "production")]
        mode: String,
    },
    /// Pre-bundle installed candidate modules and exit
    Prebundle {
        #[arg(short, long, default_value = ".")]
        root: String,
        #[arg(long, default_value = "development")]
        mode: String,
        /// Bundler backend
        #[arg(long, value_enum)]
        bundler: Option<BundlerKind>,
        /// esbuild executable for the esbuild backend
        #[arg(long)]
        esbuild_path: Option<String>,
    },
    /// Show which candidate modules are installed
    Info {
        #[arg(short, long, default_value = ".")]
        root: String,
    },
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        // Initialize logging
        Logger::init();

        let cli = Cli::parse();

        match cli.command {
            Commands::Dev {
                root,
                port,
                hostname,
                no_prebundle,
                watch,
                mode,
            } => {
                self.handle_dev_command(&root, port, hostname, !no_prebundle, watch, &mode)
                    .await
            }
            Commands::Build {
                root,
                entries,
                outdir,
                source_maps,
                splitting,
                watch,
                no_prebundle,
                mode,
            } => {
                let overrides = BuildOverrides {
                    entries,
                    outdir,
                    source_maps: source_maps.then_some(true),
                    code_splitting: splitting.then_some(true),
                    mode: Some(mode),
                };
                self.handle_build_command(&root, overrides, watch, !no_prebundle)
                    .await
            }
            Commands::Prebundle {
                root,
                mode,
                bundler,
                esbuild_path,
            } => {
                self.handle_prebundle_command(&root, &mode, bundler, esbuild_path)
                    .await
            }
            Commands::Info { root } => self.handle_info_command(&root).await,
        }
    }

    async fn handle_build_command(
        &self,
        root: &str,
        overrides: BuildOverrides,
        watch: bool,
        prebundle: bool,
    ) -> Result<()> {
        let root = resolve_root(root).await?;
        let file_config = ConfigLoader::load_from_file(&root)?;
        let mode = overrides
            .mode
            .clone()
            .unwrap_or_else(|| "production".to_string());
        let env = EnvVarsManager::load_from_files(&root, &mode)?.into_map();

        let devkit_config = file_config.clone().unwrap_or_default();
        let mut config = ConfigLoader::merge_with_cli(file_config, root.clone(), overrides);
        let mut define = stringify_process_envs(&env);
        define.extend(config.define);
        config.define = define;

        let bundler: Arc<dyn Bundler> = Arc::new(NativeBundler::new());
        let mut build_service = DevkitBuildService::new(bundler);

        if prebundle && devkit_config.prebundle.enabled.unwrap_or(true) {
            let plugin = prebundle_plugin(&root, &devkit_config, env, None, None);
            build_service = build_service.with_plugin(Arc::new(plugin));
        }

        if watch {
            let watch_config = WatchConfig {
                watch_paths: vec![root.clone()],
                ..Default::default()
            };
            return BuildWatcher::new(watch_config, config)
                .watch(&build_service)
                .await;
        }

        let result = build_service.build(&config).await?;

        if !result.success {
            for error in &result.errors {
                Logger::error(error);
            }
        }

        Ok(())
    }

    async fn handle_dev_command(
        &self,
        root: &str,
        port: Option<u16>,
        hostname: Option<String>,
        prebundle: bool,
        watch: bool,
        mode: &str,
    ) -> Result<()> {
        let root = resolve_root(root).await?;
        let file_config = ConfigLoader::load_from_file(&root)?.unwrap_or_default();
        let env = EnvVarsManager::load_from_files(&root, mode)?.into_map();
        let server = &file_config.server;

        let mut config = DevServerCoreConfig::new(root.clone());
        config.port = port.or(server.port).unwrap_or(config.port);
        config.hostname = hostname
            .or_else(|| server.hostname.clone())
            .unwrap_or(config.hostname);
        config.base_path = server.base_path.clone();
        config.mime_types = server.mime_types.clone();
        config.cors = server.cors.unwrap_or(config.cors);
        config.watch = watch || server.watch.unwrap_or(false);
        config.inject_web_socket = server.inject_web_socket.unwrap_or(config.inject_web_socket);

        if prebundle && file_config.prebundle.enabled.unwrap_or(true) {
            let plugin = prebundle_plugin(&root, &file_config, env, None, None);
            let context = PluginContext::new(root.clone(), root.join(PREBUNDLED_MODULES_DIR), mode);
            config
                .plugins
                .push(Arc::new(BuildPluginAdapter::new(Arc::new(plugin), context)));
        }

        let server = DevServer::new(config, Arc::new(TracingLogger::new()));
        server.start().await?;
        Logger::info("Press Ctrl+C to stop the server");

        tokio::signal::ctrl_c().await?;
        Logger::info("🛑 Stopping dev server");
        server.stop().await
    }

    async fn handle_prebundle_command(
        &self,
        root: &str,
        mode: &str,
        bundler: Option<BundlerKind>,
        esbuild_path: Option<String>,
    ) -> Result<()> {
        let root = resolve_root(root).await?;
        let file_config = ConfigLoader::load_from_file(&root)?.unwrap_or_default();
        let env = EnvVarsManager::load_from_files(&root, mode)?.into_map();

        let plugin = prebundle_plugin(&root, &file_config, env, bundler, esbuild_path);
        let context = PluginContext::new(root.clone(), root.join(PREBUNDLED_MODULES_DIR), mode);
        crate::core::plugin::Plugin::on_build_start(&plugin, &context).await?;

        let mut modules: Vec<_> = plugin.module_paths().into_iter().collect();
        modules.sort();
        for (module, path) in modules {
            Logger::info(&format!("  {} → {}", module, path.display()));
        }

        Ok(())
    }

    async fn handle_info_command(&self, root: &str) -> Result<()> {
        let root = resolve_root(root).await?;
        let file_config = ConfigLoader::load_from_file(&root)?.unwrap_or_default();
        let plugin = prebundle_plugin(&root, &file_config, HashMap::new(), None, None);

        Logger::info(&format!("🦀 devkit v{}", env!("CARGO_PKG_VERSION")));
        Logger::info(&format!("📁 Root: {}", root.display()));
        Logger::info(&format!("📦 Pre-bundle output: {}", PREBUNDLED_MODULES_DIR));

        let available = plugin.available_modules(&root).await;
        for candidate in plugin.candidates() {
            let mark = if available.contains(candidate) { "✅" } else { "  " };
            Logger::info(&format!("  {} {}", mark, candidate));
        }
        Logger::info(&format!(
            "{} of {} candidates installed",
            available.len(),
            plugin.candidates().len()
        ));

        Ok(())
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}

async fn resolve_root(root: &str) -> Result<PathBuf> {
    Ok(tokio::fs::canonicalize(root).await?)
}

/// Prebundle plugin configured from the config file, with CLI overrides for the backend
fn prebundle_plugin(
    root: &Path,
    config: &DevkitConfig,
    env: HashMap<String, String>,
    bundler: Option<BundlerKind>,
    esbuild_path: Option<String>,
) -> PrebundleModulesPlugin {
    let section = &config.prebundle;
    let kind = bundler.or(section.bundler).unwrap_or_default();
    let esbuild_path = esbuild_path.or_else(|| section.esbuild_path.clone());

    let mut plugin = PrebundleModulesPlugin::new(env).with_bundler(create_bundler(kind, esbuild_path, root));
    if let Some(candidates) = &section.candidates {
        plugin = plugin.with_candidates(candidates.clone());
    }
    plugin
}

pub fn create_bundler(kind: BundlerKind, esbuild_path: Option<String>, root: &Path) -> Arc<dyn Bundler> {
    match kind {
        BundlerKind::Native => Arc::new(NativeBundler::new()),
        BundlerKind::Esbuild => Arc::new(match esbuild_path {
            Some(path) => EsbuildBundler::new(path),
            None => EsbuildBundler::locate(root),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_command() {
        let cli = Cli::try_parse_from([
            "devkit",
            "build",
            "--entry",
            "./src/a.js",
            "--entry",
            "./src/b.js",
            "--splitting",
        ])
        .unwrap();

        match cli.command {
            Commands::Build {
                entries, splitting, source_maps, mode, ..
            } => {
                assert_eq!(entries, vec!["./src/a.js", "./src/b.js"]);
                assert!(splitting);
                assert!(!source_maps);
                assert_eq!(mode, "production");
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn test_parse_prebundle_command() {
        let cli = Cli::try_parse_from(["devkit", "prebundle", "--bundler", "esbuild"]).unwrap();
        match cli.command {
            Commands::Prebundle { bundler, mode, .. } => {
                assert_eq!(bundler, Some(BundlerKind::Esbuild));
                assert_eq!(mode, "development");
            }
            _ => panic!("expected prebundle command"),
        }
    }

    #[test]
    fn test_create_bundler() {
        let root = Path::new("/nonexistent");
        assert_eq!(create_bundler(BundlerKind::Native, None, root).name(), "native");
        assert_eq!(
            create_bundler(BundlerKind::Esbuild, Some("/bin/esbuild".into()), root).name(),
            "esbuild"
        );
    }

    #[test]
    fn test_prebundle_plugin_uses_configured_candidates() {
        let mut config = DevkitConfig::default();
        config.prebundle.candidates = Some(vec!["left-pad".to_string()]);

        let plugin = prebundle_plugin(Path::new("/app"), &config, HashMap::new(), None, None);
        assert_eq!(plugin.candidates(), ["left-pad".to_string()]);
    }
}
