use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the global subscriber. `RUST_LOG` wins over the default filter.
    pub fn init() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("devkit=info"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }

    pub fn build_start(root: &Path, outdir: &Path) {
        info!("🔨 devkit build");
        info!("📁 Input: {}", root.display());
        info!("📦 Output: {}", outdir.display());
    }

    pub fn prebundle_start(available: usize, candidates: usize) {
        info!(
            "📦 Pre-bundling {} of {} candidate modules",
            available, candidates
        );
    }

    pub fn candidate_skipped(id: &str) {
        debug!("⏭️  Candidate not installed: {}", id);
    }

    pub fn resolving_module(specifier: &str) {
        debug!("🔍 Resolving: {}", specifier);
    }

    pub fn processing_file(name: &str, mode: &str) {
        debug!("⚡ Processing: {} ({})", name, mode);
    }

    pub fn bundle_complete(entries: usize, modules: usize, outdir: &Path, build_time: std::time::Duration) {
        info!(
            "✅ Bundled {} entries ({} modules) into {} in {:.2?}",
            entries,
            modules,
            outdir.display(),
            build_time
        );
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
