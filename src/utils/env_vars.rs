use crate::utils::{DevkitError, Logger, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Environment variables manager for build-time variable injection
pub struct EnvVarsManager {
    variables: HashMap<String, String>,
}

impl EnvVarsManager {
    /// Create a new environment variables manager
    pub fn new() -> Self {
        Self {
            variables: HashMap::new(),
        }
    }

    /// Load environment variables from .env files
    pub fn load_from_files(root: &Path, mode: &str) -> Result<Self> {
        let mut manager = Self::new();

        // Later files override earlier ones:
        // .env < .env.local < .env.{mode} < .env.{mode}.local
        let env_files = [
            root.join(".env"),
            root.join(".env.local"),
            root.join(format!(".env.{}", mode)),
            root.join(format!(".env.{}.local", mode)),
        ];

        for env_file in env_files {
            if env_file.exists() {
                manager.load_env_file(&env_file)?;
            }
        }

        manager.variables.insert("NODE_ENV".to_string(), mode.to_string());
        manager.variables.insert("MODE".to_string(), mode.to_string());
        manager.variables.insert(
            "DEV".to_string(),
            if mode == "development" { "true" } else { "false" }.to_string(),
        );
        manager.variables.insert(
            "PROD".to_string(),
            if mode == "production" { "true" } else { "false" }.to_string(),
        );

        Logger::debug(&format!("Loaded {} environment variables", manager.variables.len()));

        Ok(manager)
    }

    /// Load variables from a specific .env file
    fn load_env_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(DevkitError::Io)?;

        Logger::debug(&format!("Loading env file: {}", path.display()));

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = self.parse_env_line(line) {
                self.variables.insert(key, value);
            } else {
                Logger::warn(&format!(
                    "Invalid env line in {} at line {}: {}",
                    path.display(),
                    line_num + 1,
                    line
                ));
            }
        }

        Ok(())
    }

    /// Parse a single `KEY=VALUE` line
    fn parse_env_line(&self, line: &str) -> Option<(String, String)> {
        let eq_pos = line.find('=')?;

        let key = line[..eq_pos].trim();
        let value = line[eq_pos + 1..].trim();

        let first = key.chars().next()?;
        if !first.is_alphabetic() && first != '_' {
            return None;
        }

        if !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return None;
        }

        let value = if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            &value[1..value.len() - 1]
        } else {
            value
        };

        Some((key.to_string(), value.to_string()))
    }

    pub fn set(&mut self, key: String, value: String) {
        self.variables.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    pub fn get_all(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.variables
    }
}

impl Default for EnvVarsManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn raw environment variables into bundler `define` entries.
///
/// Every `KEY` becomes `process.env.KEY`, its value JSON-encoded so that it is
/// substituted as a string literal.
pub fn stringify_process_envs(env: &HashMap<String, String>) -> BTreeMap<String, String> {
    env.iter()
        .map(|(key, value)| {
            (
                format!("process.env.{}", key),
                serde_json::Value::String(value.clone()).to_string(),
            )
        })
        .collect()
}
