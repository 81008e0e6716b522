use super::plugin::Plugin;
use async_trait::async_trait;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use glob::{MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Glob pattern → MIME type, or a file extension whose MIME type should be used
/// (`"*.ts": "js"`).
pub type MimeTypeMappings = BTreeMap<String, String>;

/// Runs around every request before the dev server pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: Request, next: Next) -> Response;
}

/// Dev server configuration
#[derive(Clone)]
pub struct DevServerCoreConfig {
    pub port: u16,
    pub hostname: String,
    pub root_dir: PathBuf,
    /// Prefix stripped from request paths before they are resolved
    pub base_path: Option<String>,
    pub mime_types: MimeTypeMappings,
    pub plugins: Vec<Arc<dyn Plugin>>,
    /// Applied in order, the first entry runs outermost
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub inject_web_socket: bool,
    pub cors: bool,
    /// Broadcast a reload to connected browsers when files change
    pub watch: bool,
}

impl DevServerCoreConfig {
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            port: 8000,
            hostname: "localhost".to_string(),
            root_dir,
            base_path: None,
            mime_types: MimeTypeMappings::new(),
            plugins: Vec::new(),
            middleware: Vec::new(),
            inject_web_socket: true,
            cors: true,
            watch: false,
        }
    }

    /// MIME type from the configured glob mappings, if any pattern matches `browser_path`
    pub fn mapped_mime_type(&self, browser_path: &str) -> Option<String> {
        let relative = browser_path.trim_start_matches('/');
        self.mime_types.iter().find_map(|(pattern, mime)| {
            let matches = Pattern::new(pattern)
                .map(|glob| {
                    glob.matches_with(relative, SEGMENT_MATCH)
                        || glob.matches_with(browser_path, SEGMENT_MATCH)
                })
                .unwrap_or(false);
            matches.then(|| {
                if mime.contains('/') {
                    mime.clone()
                } else {
                    mime_type_for_extension(mime).to_string()
                }
            })
        })
    }
}

impl std::fmt::Debug for DevServerCoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServerCoreConfig")
            .field("port", &self.port)
            .field("hostname", &self.hostname)
            .field("root_dir", &self.root_dir)
            .field("base_path", &self.base_path)
            .field("mime_types", &self.mime_types)
            .field("plugins", &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("middleware", &self.middleware.len())
            .field("inject_web_socket", &self.inject_web_socket)
            .field("cors", &self.cors)
            .field("watch", &self.watch)
            .finish()
    }
}

/// `*` and `?` stay within one path segment, `**/` spans directories
const SEGMENT_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// MIME type by file extension, without the leading dot
pub fn mime_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" | "cjs" | "jsx" => "application/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" | "map" => "application/json; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// MIME type of a path by its extension
pub fn mime_type_for_path(path: &Path) -> &'static str {
    mime_type_for_extension(path.extension().and_then(|e| e.to_str()).unwrap_or(""))
}
