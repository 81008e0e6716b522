// Watch mode: rebuild on debounced source changes

use crate::core::interfaces::BuildService;
use crate::core::models::BuildConfig;
use crate::utils::{DevkitError, Logger, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Configuration for watch mode
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Paths to watch for changes
    pub watch_paths: Vec<PathBuf>,
    /// Debounce delay in milliseconds
    pub debounce_ms: u64,
    /// Whether to show detailed logging
    pub verbose: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watch_paths: vec![PathBuf::from(".")],
            debounce_ms: 100,
            verbose: false,
        }
    }
}

/// File watcher that monitors changes and triggers rebuilds
pub struct BuildWatcher {
    config: WatchConfig,
    build_config: BuildConfig,
}

impl BuildWatcher {
    pub fn new(config: WatchConfig, build_config: BuildConfig) -> Self {
        Self {
            config,
            build_config,
        }
    }

    /// Run an initial build, then rebuild on every debounced batch of changes until Ctrl+C.
    pub async fn watch<B: BuildService + ?Sized>(&self, build_service: &B) -> Result<()> {
        Logger::info("👀 Watch mode started - monitoring for changes...");
        Logger::info(&format!(
            "   Watching: {}",
            self.config
                .watch_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ));

        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        )?;

        for path in &self.config.watch_paths {
            if path.exists() {
                watcher.watch(path, RecursiveMode::Recursive)?;
            }
        }

        Logger::info("🔨 Initial build...");
        match build_service.build(&self.build_config).await {
            Ok(_) => Logger::info("✅ Initial build complete"),
            Err(e) => Logger::error(&format!("Initial build failed: {}", e)),
        }

        let mut changed_files = HashSet::new();
        let mut last_change = Instant::now();
        let debounce = Duration::from_millis(self.config.debounce_ms);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    Logger::info("👋 Stopping watch mode...");
                    break;
                }
                event = tokio::time::timeout(Duration::from_millis(50), rx.recv()) => {
                    match event {
                        Ok(Some(event)) => {
                            if self.should_ignore_event(&event) {
                                continue;
                            }
                            for path in &event.paths {
                                if is_source_file(path) {
                                    changed_files.insert(path.clone());
                                    last_change = Instant::now();
                                    if self.config.verbose {
                                        Logger::debug(&format!("Changed: {}", path.display()));
                                    }
                                }
                            }
                        }
                        Ok(None) => {
                            return Err(DevkitError::Other("Watch channel disconnected".to_string()));
                        }
                        Err(_) => {
                            if !changed_files.is_empty() && last_change.elapsed() >= debounce {
                                self.trigger_rebuild(&changed_files, build_service).await;
                                changed_files.clear();
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn trigger_rebuild<B: BuildService + ?Sized>(
        &self,
        changed_files: &HashSet<PathBuf>,
        build_service: &B,
    ) {
        Logger::info(&format!("🔄 Rebuilding... ({} files changed)", changed_files.len()));

        let start = Instant::now();
        match build_service.build(&self.build_config).await {
            Ok(result) => Logger::info(&format!(
                "✅ Rebuild complete in {:.0}ms ({} modules)",
                start.elapsed().as_millis(),
                result.modules_bundled
            )),
            Err(e) => Logger::error(&format!("Rebuild failed: {}", e)),
        }
    }

    fn should_ignore_event(&self, event: &Event) -> bool {
        match &event.kind {
            EventKind::Access(_) | EventKind::Other => true,
            _ => event
                .paths
                .iter()
                .any(|p| is_ignored_path(p, &self.build_config.outdir)),
        }
    }
}

/// Paths whose changes never trigger a rebuild: dependencies, VCS, build output and editor temp files.
pub fn is_ignored_path(path: &Path, outdir: &Path) -> bool {
    if !outdir.as_os_str().is_empty() && outdir != Path::new(".") && path.starts_with(outdir) {
        return true;
    }

    let path_str = path.to_string_lossy();
    path.components().any(|c| {
        let c = c.as_os_str();
        c == "node_modules" || c == ".git"
    }) || path_str.ends_with('~')
        || path_str.ends_with(".swp")
        || path_str.ends_with(".tmp")
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| matches!(ext, "js" | "jsx" | "mjs" | "cjs" | "json" | "css" | "html"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_config_default() {
        let config = WatchConfig::default();
        assert_eq!(config.debounce_ms, 100);
        assert!(!config.verbose);
    }

    #[test]
    fn test_is_source_file() {
        assert!(is_source_file(Path::new("test.js")));
        assert!(is_source_file(Path::new("data.json")));
        assert!(is_source_file(Path::new("index.html")));
        assert!(!is_source_file(Path::new("test.txt")));
        assert!(!is_source_file(Path::new("README.md")));
    }

    #[test]
    fn test_ignored_paths() {
        let outdir = PathBuf::from("/app/dist");

        assert!(is_ignored_path(Path::new("/app/node_modules/react/index.js"), &outdir));
        assert!(is_ignored_path(Path::new("/app/.git/HEAD"), &outdir));
        assert!(is_ignored_path(Path::new("/app/dist/main.js"), &outdir));
        assert!(is_ignored_path(Path::new("/app/src/main.js~"), &outdir));
        assert!(is_ignored_path(Path::new("/app/src/.main.js.swp"), &outdir));
        assert!(!is_ignored_path(Path::new("/app/src/main.js"), &outdir));
        assert!(!is_ignored_path(Path::new("/app/src/distance.js"), &outdir));
    }
}
