use super::context::Context;
use super::plugin::{Plugin, ResolveOptions, ServerStartParams};
use crate::core::plugin::{Plugin as BuildPlugin, PluginContext};
use crate::utils::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Runs a build plugin inside the dev server.
///
/// `server_start` triggers the build plugin's `on_build_start`; `resolve_import`
/// asks its `resolve` hook and turns the file into a root-relative browser path.
pub struct BuildPluginAdapter {
    plugin: Arc<dyn BuildPlugin>,
    context: PluginContext,
}

impl BuildPluginAdapter {
    pub fn new(plugin: Arc<dyn BuildPlugin>, context: PluginContext) -> Self {
        Self { plugin, context }
    }

    fn browser_path(&self, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(&self.context.root).ok()?;
        Some(format!("/{}", relative.to_string_lossy().replace('\\', "/")))
    }
}

#[async_trait]
impl Plugin for BuildPluginAdapter {
    fn name(&self) -> &str {
        self.plugin.name()
    }

    async fn server_start(&self, _params: &ServerStartParams) -> Result<()> {
        self.plugin.on_build_start(&self.context).await
    }

    async fn resolve_import(
        &self,
        source: &str,
        context: &Context,
        _options: &ResolveOptions,
    ) -> Result<Option<String>> {
        let importer = context.file_path();
        let resolved = self
            .plugin
            .resolve(source, Some(&importer), &self.context)
            .await?;

        Ok(resolved.and_then(|file| self.browser_path(&file)))
    }
}
