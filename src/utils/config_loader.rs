use crate::core::models::{BuildConfig, ModuleFormat};
use crate::utils::{DevkitError, Logger, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "devkit.config.json";

/// Configuration file format (devkit.config.json)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevkitConfig {
    pub server: ServerSection,
    pub prebundle: PrebundleSection,
    pub build: BuildSection,
    /// Extra compile-time replacements, merged over the `.env` derived ones
    pub define: BTreeMap<String, String>,
    pub alias: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub hostname: Option<String>,
    pub base_path: Option<String>,
    pub mime_types: BTreeMap<String, String>,
    pub cors: Option<bool>,
    pub watch: Option<bool>,
    pub inject_web_socket: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrebundleSection {
    pub enabled: Option<bool>,
    /// Replaces the built-in candidate list
    pub candidates: Option<Vec<String>>,
    pub bundler: Option<BundlerKind>,
    pub esbuild_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildSection {
    pub entries: Vec<String>,
    pub outdir: Option<String>,
    pub format: Option<ModuleFormat>,
    pub source_maps: Option<bool>,
    pub code_splitting: Option<bool>,
    pub external: Vec<String>,
}

/// Which backend produces bundles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BundlerKind {
    #[default]
    Native,
    Esbuild,
}

/// Build flags given on the command line. `None` defers to the config file.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    pub entries: Vec<String>,
    pub outdir: Option<String>,
    pub source_maps: Option<bool>,
    pub code_splitting: Option<bool>,
    pub mode: Option<String>,
}

/// Config loader that supports config files with CLI override
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `devkit.config.json` from the project root, if present
    pub fn load_from_file(root: &Path) -> Result<Option<DevkitConfig>> {
        let config_path = root.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            Logger::debug(&format!("No {} found, using defaults", CONFIG_FILE_NAME));
            return Ok(None);
        }

        Logger::debug(&format!("Loading config from {}", config_path.display()));

        let content = std::fs::read_to_string(&config_path).map_err(DevkitError::Io)?;
        let config: DevkitConfig = serde_json::from_str(&content).map_err(|e| {
            DevkitError::config(format!("Failed to parse {}: {}", CONFIG_FILE_NAME, e))
        })?;

        Logger::debug("✅ Config file loaded successfully");
        Ok(Some(config))
    }

    /// Merge file config with CLI arguments (CLI takes precedence)
    pub fn merge_with_cli(
        file_config: Option<DevkitConfig>,
        root: PathBuf,
        overrides: BuildOverrides,
    ) -> BuildConfig {
        let base = file_config.unwrap_or_default();
        let build = base.build;

        let outdir = overrides
            .outdir
            .or(build.outdir)
            .unwrap_or_else(|| "dist".to_string());

        let entries = if overrides.entries.is_empty() {
            build.entries
        } else {
            overrides.entries
        };

        BuildConfig {
            root,
            outdir: PathBuf::from(outdir),
            entries,
            format: build.format.unwrap_or_default(),
            enable_source_maps: overrides
                .source_maps
                .or(build.source_maps)
                .unwrap_or(false),
            enable_code_splitting: overrides
                .code_splitting
                .or(build.code_splitting)
                .unwrap_or(false),
            mode: overrides.mode.unwrap_or_else(|| "production".to_string()),
            alias: base.alias,
            define: base.define,
            external: build.external,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_file_not_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::load_from_file(temp_dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_from_file_valid() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            r#"{
                "server": { "port": 9000, "mimeTypes": { "**/*.ts": "js" } },
                "prebundle": { "candidates": ["react"], "bundler": "esbuild", "esbuildPath": "/bin/esbuild" },
                "build": { "entries": ["./src/main.js"], "sourceMaps": true }
            }"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(temp_dir.path()).unwrap().unwrap();

        assert_eq!(config.server.port, Some(9000));
        assert_eq!(config.server.mime_types.get("**/*.ts").map(String::as_str), Some("js"));
        assert_eq!(config.prebundle.candidates, Some(vec!["react".to_string()]));
        assert_eq!(config.prebundle.bundler, Some(BundlerKind::Esbuild));
        assert_eq!(config.prebundle.esbuild_path.as_deref(), Some("/bin/esbuild"));
        assert_eq!(config.build.source_maps, Some(true));
        assert!(config.define.is_empty());
    }

    #[test]
    fn test_load_from_file_invalid() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "{ nope").unwrap();

        let err = ConfigLoader::load_from_file(temp_dir.path()).unwrap_err();
        assert!(matches!(err, DevkitError::Config(_)));
    }

    #[test]
    fn test_merge_with_cli_override() {
        let mut file_config = DevkitConfig::default();
        file_config.build.outdir = Some("build".to_string());
        file_config.build.entries = vec!["./src/a.js".to_string()];
        file_config.build.source_maps = Some(true);
        file_config
            .define
            .insert("__VERSION__".to_string(), "\"1.0\"".to_string());

        let merged = ConfigLoader::merge_with_cli(
            Some(file_config),
            PathBuf::from("."),
            BuildOverrides {
                outdir: Some("dist-override".to_string()),
                source_maps: Some(false),
                ..Default::default()
            },
        );

        assert_eq!(merged.outdir, PathBuf::from("dist-override"));
        assert_eq!(merged.entries, vec!["./src/a.js"]);
        assert!(!merged.enable_source_maps);
        assert_eq!(merged.mode, "production");
        assert_eq!(merged.define.get("__VERSION__").map(String::as_str), Some("\"1.0\""));
    }
}
