use crate::core::plugin::{Plugin, PluginContext};
use crate::infrastructure::node_resolver::{NodeModuleResolver, Resolution};
use crate::utils::{Logger, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static EXPORTS_ASSIGN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^.\w$])(?:module\.)?exports\.([A-Za-z_$][\w$]*)\s*=[^=]").unwrap()
});

static EXPORTS_INDEX_ASSIGN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[^.\w$])(?:module\.)?exports\[\s*['"]([^'"]+)['"]\s*\]\s*=[^=]"#).unwrap()
});

static DEFINE_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"Object\.defineProperty\(\s*(?:module\.)?exports\s*,\s*['"]([^'"]+)['"]"#).unwrap()
});

static MODULE_EXPORTS_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"module\.exports\s*=\s*\{([^}]*)\}").unwrap());

static MODULE_EXPORTS_REQUIRE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"module\.exports\s*=\s*require\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap()
});

/// How many `module.exports = require(...)` hops are followed
const MAX_REEXPORT_DEPTH: usize = 8;

/// Reports the named exports of CommonJS modules so that ESM bundles can
/// re-export them statically.
pub struct CommonJsPlugin {
    resolver: NodeModuleResolver,
}

impl CommonJsPlugin {
    pub fn new() -> Self {
        Self {
            resolver: NodeModuleResolver::new(),
        }
    }

    /// Named exports visible in a single CommonJS source, plus the specifier
    /// it re-exports wholesale, if any.
    pub fn scan_exports(code: &str) -> (Vec<String>, Option<String>) {
        let mut names = Vec::new();
        let mut push = |name: &str| {
            if name != "__esModule" && name != "default" && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        };

        for caps in EXPORTS_ASSIGN.captures_iter(code) {
            push(&caps[1]);
        }
        for caps in EXPORTS_INDEX_ASSIGN.captures_iter(code) {
            push(&caps[1]);
        }
        for caps in DEFINE_PROPERTY.captures_iter(code) {
            push(&caps[1]);
        }
        for caps in MODULE_EXPORTS_OBJECT.captures_iter(code) {
            for key in object_literal_keys(&caps[1]) {
                push(&key);
            }
        }

        let reexport = MODULE_EXPORTS_REQUIRE
            .captures(code)
            .map(|caps| caps[1].to_string());

        (names, reexport)
    }
}

impl Default for CommonJsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for CommonJsPlugin {
    fn name(&self) -> &str {
        "commonjs"
    }

    async fn detect_exports(
        &self,
        code: &str,
        file_path: &Path,
        context: &PluginContext,
    ) -> Result<Option<Vec<String>>> {
        let (mut names, mut reexport) = Self::scan_exports(code);
        let mut current: PathBuf = file_path.to_path_buf();

        for _ in 0..MAX_REEXPORT_DEPTH {
            let Some(specifier) = reexport.take() else {
                break;
            };

            let Some(Resolution::File(target)) = self
                .resolver
                .resolve(&specifier, Some(&current), &context.root)
                .await
            else {
                Logger::debug(&format!(
                    "Re-exported module '{}' from {} not resolvable",
                    specifier,
                    current.display()
                ));
                break;
            };

            let target_code = tokio::fs::read_to_string(&target).await?;
            let (target_names, next) = Self::scan_exports(&target_code);
            for name in target_names {
                if !names.contains(&name) {
                    names.push(name);
                }
            }

            reexport = next;
            current = target;
        }

        Ok(Some(names))
    }
}

/// Keys of a flat object literal body: `a: 1, b, "c": 2, d() {}`
fn object_literal_keys(body: &str) -> Vec<String> {
    body.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() || entry.starts_with("...") {
                return None;
            }
            let key = entry
                .split(|c| c == ':' || c == '(')
                .next()
                .unwrap_or("")
                .trim()
                .trim_start_matches("async ")
                .trim_matches(|c| c == '"' || c == '\'');
            let valid = key
                .chars()
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
                && key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
            valid.then(|| key.to_string())
        })
        .collect()
}
