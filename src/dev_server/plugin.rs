use super::config::DevServerCoreConfig;
use super::context::Context;
use super::logger::Logger;
use super::websockets::WebSocketsManager;
use crate::utils::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Handed to every plugin when the server starts
#[derive(Clone)]
pub struct ServerStartParams {
    pub config: Arc<DevServerCoreConfig>,
    pub logger: Arc<dyn Logger>,
    pub web_sockets: WebSocketsManager,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveOptions {
    pub is_dynamic_import: bool,
}

/// Response produced by a plugin in place of a static file
#[derive(Debug, Clone, PartialEq)]
pub struct ServeResult {
    pub body: String,
    pub content_type: Option<String>,
}

impl ServeResult {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformResult {
    pub body: Option<String>,
    pub content_type: Option<String>,
}

/// Dev server plugin. Every hook is optional.
///
/// Hooks run in registration order. `serve` and `resolve_import` stop at the
/// first plugin returning `Some`, `transform` and `transform_import` chain.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn server_start(&self, _params: &ServerStartParams) -> Result<()> {
        Ok(())
    }

    async fn server_stop(&self) -> Result<()> {
        Ok(())
    }

    async fn serve(&self, _context: &Context) -> Result<Option<ServeResult>> {
        Ok(None)
    }

    fn resolve_mime_type(&self, _context: &Context) -> Option<String> {
        None
    }

    async fn transform(&self, _context: &Context, _body: &str) -> Result<Option<TransformResult>> {
        Ok(None)
    }

    /// Map an import specifier found in served JavaScript to a browser path
    async fn resolve_import(
        &self,
        _source: &str,
        _context: &Context,
        _options: &ResolveOptions,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    async fn transform_import(
        &self,
        _source: &str,
        _context: &Context,
        _options: &ResolveOptions,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}
