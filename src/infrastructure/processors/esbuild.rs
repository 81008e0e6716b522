use crate::core::interfaces::Bundler;
use crate::core::models::*;
use crate::infrastructure::processors::native_bundler::entry_output_name;
use crate::utils::{DevkitError, Logger, Result, Timer};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Delegates bundling to an external `esbuild` executable.
///
/// Plugins cannot cross the process boundary, so `options.plugins` is ignored
/// apart from a warning.
pub struct EsbuildBundler {
    binary: PathBuf,
}

impl EsbuildBundler {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Prefer the project-local install, then whatever is on `PATH`
    pub fn locate(root: &Path) -> Self {
        let local = root.join("node_modules/.bin/esbuild");
        if local.is_file() {
            Self::new(local)
        } else {
            Self::new("esbuild")
        }
    }

    pub fn command_args(options: &BundleOptions) -> Vec<String> {
        let mut args = Vec::new();

        for entry in &options.entry_points {
            let output = entry_output_name(entry, Path::new(entry));
            let output = output.strip_suffix(".js").unwrap_or(&output);
            args.push(format!("{}={}", output, entry));
        }

        if options.bundle {
            args.push("--bundle".to_string());
        }
        args.push(format!("--format={}", options.format));
        if options.splitting {
            args.push("--splitting".to_string());
        }
        if options.sourcemap {
            args.push("--sourcemap".to_string());
        }
        args.push(format!("--outdir={}", options.outdir.display()));

        for (from, to) in &options.alias {
            args.push(format!("--alias:{}={}", from, to));
        }
        for (key, value) in &options.define {
            args.push(format!("--define:{}={}", key, value));
        }
        for external in &options.external {
            args.push(format!("--external:{}", external));
        }

        args
    }
}

#[async_trait]
impl Bundler for EsbuildBundler {
    fn name(&self) -> &str {
        "esbuild"
    }

    async fn build(&self, options: &BundleOptions) -> Result<BundleResult> {
        if options.entry_points.is_empty() {
            return Ok(BundleResult::default());
        }

        let _timer = Timer::start("esbuild");
        let mut warnings = Vec::new();
        if !options.plugins.is_empty() {
            let message = format!(
                "esbuild runs out of process; {} plugin(s) were not applied",
                options.plugins.len()
            );
            Logger::warn(&message);
            warnings.push(message);
        }

        let args = Self::command_args(options);
        Logger::debug(&format!("{} {}", self.binary.display(), args.join(" ")));

        let output = Command::new(&self.binary)
            .args(&args)
            .current_dir(&options.root)
            .output()
            .await
            .map_err(|e| {
                DevkitError::build(format!(
                    "Failed to launch {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(DevkitError::build(format!(
                "esbuild exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        warnings.extend(
            stderr
                .lines()
                .filter(|line| line.contains("[WARNING]"))
                .map(|line| line.trim().to_string()),
        );

        let outdir = options.absolute_outdir();
        let mut result = BundleResult {
            warnings,
            ..Default::default()
        };
        for entry in &options.entry_points {
            let path = outdir.join(entry_output_name(entry, Path::new(entry)));
            if let Ok(content) = tokio::fs::read_to_string(&path).await {
                result.output_files.push(OutputFile::new(path.clone(), content));
            }
            result.entry_outputs.insert(entry.clone(), path);
        }
        result.modules_bundled = result.entry_outputs.len();

        Ok(result)
    }
}
