use crate::utils::Logger;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Path alias resolver for import path resolution
pub struct PathAliasResolver {
    aliases: BTreeMap<String, String>,
    root: PathBuf,
}

impl PathAliasResolver {
    /// Create a new path alias resolver
    pub fn new(aliases: BTreeMap<String, String>, root: PathBuf) -> Self {
        Logger::debug(&format!("🔗 Initialized PathAliasResolver with {} aliases", aliases.len()));
        for (alias, target) in &aliases {
            Logger::debug(&format!("  {} → {}", alias, target));
        }

        Self { aliases, root }
    }

    /// Resolve an import path using aliases
    /// Returns the resolved path if an alias matches, or None if no alias found
    pub fn resolve(&self, import_path: &str) -> Option<PathBuf> {
        // Exact match first (e.g. "assert", "@")
        if let Some(target) = self.aliases.get(import_path) {
            return Some(self.resolve_target(target));
        }

        // Prefix match, longest alias wins ("lodash/uniq.js" → lodash-es dir + "uniq.js")
        let (alias, target) = self
            .aliases
            .iter()
            .filter(|(alias, _)| {
                import_path.len() > alias.len()
                    && import_path.starts_with(alias.as_str())
                    && import_path.as_bytes()[alias.len()] == b'/'
            })
            .max_by_key(|(alias, _)| alias.len())?;

        let rest = &import_path[alias.len() + 1..];
        let final_path = self.resolve_target(target).join(rest);

        Logger::debug(&format!("🔗 Resolved alias: {} → {}", import_path, final_path.display()));
        Some(final_path)
    }

    /// Resolve a target path relative to root
    fn resolve_target(&self, target: &str) -> PathBuf {
        let path = Path::new(target);

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(target.strip_prefix("./").unwrap_or(target))
        }
    }

    /// Check if an import path matches any alias
    pub fn matches_alias(&self, import_path: &str) -> bool {
        self.aliases.keys().any(|alias| {
            import_path == alias
                || import_path
                    .strip_prefix(alias.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
