use super::config::{mime_type_for_path, DevServerCoreConfig};
use super::context::Context;
use super::logger::Logger;
use super::plugin::{ResolveOptions, ServerStartParams};
use super::websockets::{
    WebSocketsManager, WEB_SOCKET_CLIENT_PATH, WEB_SOCKET_CLIENT_SCRIPT, WEB_SOCKET_PATH,
};
use crate::infrastructure::processors::js_ast::{apply_edits, import_specifiers, Edit};
use crate::utils::{is_ignored_path, DevkitError, Result};
use axum::{
    body::Body,
    extract::{Request, State, WebSocketUpgrade},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use dashmap::DashMap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

/// Script tag injected into served HTML
fn web_socket_script_tag() -> String {
    format!(
        "<script type=\"module\" src=\"{}\"></script>",
        WEB_SOCKET_CLIENT_PATH
    )
}

/// A response kept until its source file changes
#[derive(Clone)]
struct CachedResponse {
    body: String,
    content_type: String,
    file_path: PathBuf,
}

struct ServerState {
    config: Arc<DevServerCoreConfig>,
    logger: Arc<dyn Logger>,
    web_sockets: WebSocketsManager,
    transform_cache: DashMap<String, CachedResponse>,
}

/// Background pieces owned by a running server
struct Running {
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
    events: JoinHandle<()>,
    _watcher: Option<RecommendedWatcher>,
}

/// Development server: serves files from the root directory through the plugin
/// pipeline and keeps browsers connected over a web socket.
pub struct DevServer {
    state: Arc<ServerState>,
    running: Mutex<Option<Running>>,
}

impl DevServer {
    pub fn new(config: DevServerCoreConfig, logger: Arc<dyn Logger>) -> Self {
        Self {
            state: Arc::new(ServerState {
                config: Arc::new(config),
                logger,
                web_sockets: WebSocketsManager::new(),
                transform_cache: DashMap::new(),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn web_sockets(&self) -> &WebSocketsManager {
        &self.state.web_sockets
    }

    pub fn config(&self) -> &DevServerCoreConfig {
        &self.state.config
    }

    pub fn router(&self) -> Router {
        let mut app = Router::new()
            .route(WEB_SOCKET_PATH, get(handle_web_socket))
            .route(WEB_SOCKET_CLIENT_PATH, get(handle_web_socket_client))
            .fallback(handle_request)
            .with_state(self.state.clone());

        for mw in self.state.config.middleware.iter().rev() {
            let mw = mw.clone();
            app = app.layer(middleware::from_fn(move |request: Request, next: Next| {
                let mw = mw.clone();
                async move { mw.handle(request, next).await }
            }));
        }

        if self.state.config.cors {
            app = app.layer(CorsLayer::permissive());
        }

        app
    }

    /// Start watching, run plugin `server_start` hooks, then bind and serve.
    pub async fn start(&self) -> Result<SocketAddr> {
        let config = self.state.config.clone();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

        let watcher = match notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = event_tx.send(event);
            }
        }) {
            Ok(mut watcher) => match watcher.watch(&config.root_dir, RecursiveMode::Recursive) {
                Ok(()) => Some(watcher),
                Err(e) => {
                    self.state
                        .logger
                        .warn(&format!("File watching disabled: {}", e));
                    None
                }
            },
            Err(e) => {
                self.state
                    .logger
                    .warn(&format!("File watching disabled: {}", e));
                None
            }
        };

        let params = ServerStartParams {
            config: config.clone(),
            logger: self.state.logger.clone(),
            web_sockets: self.state.web_sockets.clone(),
        };
        for plugin in &config.plugins {
            plugin.server_start(&params).await?;
        }

        let listener = TcpListener::bind((config.hostname.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = self.router();
        let logger = self.state.logger.clone();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                logger.error(&format!("Dev server stopped: {}", e));
            }
        });

        let state = self.state.clone();
        let events = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                state.handle_file_event(event);
            }
        });

        *self.running.lock() = Some(Running {
            shutdown,
            server,
            events,
            _watcher: watcher,
        });

        self.state
            .logger
            .log(&format!("🚀 Dev server running on http://{}", addr));
        Ok(addr)
    }

    /// Stop serving and watching. Plugins get `server_stop` afterwards.
    pub async fn stop(&self) -> Result<()> {
        let running = self.running.lock().take();
        if let Some(running) = running {
            let _ = running.shutdown.send(());
            let _ = running.server.await;
            running.events.abort();
        }

        for plugin in &self.state.config.plugins {
            plugin.server_stop().await?;
        }
        Ok(())
    }
}

async fn handle_web_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let manager = state.web_sockets.clone();
    ws.on_upgrade(move |socket| manager.handle_socket(socket))
}

async fn handle_web_socket_client() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        WEB_SOCKET_CLIENT_SCRIPT,
    )
}

async fn handle_request(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let url = state.strip_base_path(&url);

    let mut context = Context::new(
        request.method().clone(),
        &url,
        request.headers().clone(),
        state.config.root_dir.clone(),
    );

    match state.respond(&mut context).await {
        Ok(response) => response,
        Err(DevkitError::PluginSyntax(err)) => {
            state.logger.log_syntax_error(&err.location(&context.path));
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
        Err(err) => {
            state
                .logger
                .error(&format!("Error serving {}: {}", context.url, err));
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

impl ServerState {
    fn strip_base_path(&self, url: &str) -> String {
        let Some(base) = self
            .config
            .base_path
            .as_deref()
            .map(|b| b.trim_end_matches('/'))
            .filter(|b| !b.is_empty())
        else {
            return url.to_string();
        };

        match url.strip_prefix(base) {
            Some(rest) if rest.is_empty() => "/".to_string(),
            Some(rest) if rest.starts_with('/') || rest.starts_with('?') => {
                if rest.starts_with('?') {
                    format!("/{}", rest)
                } else {
                    rest.to_string()
                }
            }
            _ => url.to_string(),
        }
    }

    async fn respond(&self, context: &mut Context) -> Result<Response> {
        if let Some(cached) = self.transform_cache.get(&context.url) {
            return Ok(text_response(cached.body.clone(), &cached.content_type));
        }

        let mut served = None;
        for plugin in &self.config.plugins {
            if let Some(result) = plugin.serve(context).await? {
                context.content_type = result.content_type.clone();
                served = Some(result.body);
                break;
            }
        }

        let file_path = context.file_path();
        let body = match served {
            Some(body) => body,
            None => {
                if !file_path.is_file() {
                    return Ok(StatusCode::NOT_FOUND.into_response());
                }
                let content_type = self.content_type(context, &file_path);
                if !is_text_mime(&content_type) {
                    let bytes = tokio::fs::read(&file_path).await?;
                    return Ok(binary_response(bytes, &content_type));
                }
                context.content_type = Some(content_type);
                tokio::fs::read_to_string(&file_path).await?
            }
        };

        if context.content_type.is_none() {
            context.content_type = Some(self.content_type(context, &file_path));
        }

        let mut body = body;
        let mut transformed = false;
        for plugin in &self.config.plugins {
            if let Some(result) = plugin.transform(context, &body).await? {
                if let Some(new_body) = result.body {
                    body = new_body;
                    transformed = true;
                }
                if let Some(content_type) = result.content_type {
                    context.content_type = Some(content_type);
                }
            }
        }

        if context.is_javascript() {
            let rewritten = self.rewrite_imports(&body, context).await?;
            transformed |= rewritten != body;
            body = rewritten;
        }

        if context.is_html() && self.config.inject_web_socket {
            body = inject_web_socket_script(&body);
        }

        let content_type = context
            .content_type
            .clone()
            .unwrap_or_else(|| mime_type_for_path(&file_path).to_string());

        // Plugin-served responses have no backing file to invalidate on
        if transformed && file_path.is_file() {
            self.transform_cache.insert(
                context.url.clone(),
                CachedResponse {
                    body: body.clone(),
                    content_type: content_type.clone(),
                    file_path,
                },
            );
        }

        Ok(text_response(body, &content_type))
    }

    /// Plugin `resolve_mime_type`, then configured globs, then the extension table
    fn content_type(&self, context: &Context, file_path: &Path) -> String {
        self.config
            .plugins
            .iter()
            .find_map(|p| p.resolve_mime_type(context))
            .or_else(|| self.config.mapped_mime_type(&context.path))
            .unwrap_or_else(|| mime_type_for_path(file_path).to_string())
    }

    /// Run import specifiers through `resolve_import` and `transform_import`
    async fn rewrite_imports(&self, code: &str, context: &Context) -> Result<String> {
        let literals = import_specifiers(code, &context.file_path())?;
        let mut replacements: HashMap<(String, bool), String> = HashMap::new();

        for literal in &literals {
            let key = (literal.specifier.clone(), literal.is_dynamic_import);
            if replacements.contains_key(&key) {
                continue;
            }

            let options = ResolveOptions {
                is_dynamic_import: literal.is_dynamic_import,
            };
            let mut resolved = literal.specifier.clone();
            for plugin in &self.config.plugins {
                if let Some(path) = plugin.resolve_import(&literal.specifier, context, &options).await? {
                    resolved = path;
                    break;
                }
            }
            for plugin in &self.config.plugins {
                if let Some(path) = plugin.transform_import(&resolved, context, &options).await? {
                    resolved = path;
                }
            }

            replacements.insert(key, resolved);
        }

        let edits: Vec<Edit> = literals
            .iter()
            .filter_map(|literal| {
                let resolved = replacements.get(&(literal.specifier.clone(), literal.is_dynamic_import))?;
                if *resolved == literal.specifier {
                    return None;
                }
                // Keep the quote style of the original literal
                let quote = &code[literal.span.start as usize..literal.span.start as usize + 1];
                Some(Edit::new(literal.span, format!("{}{}{}", quote, resolved, quote)))
            })
            .collect();

        if edits.is_empty() {
            return Ok(code.to_string());
        }
        Ok(apply_edits(code, edits))
    }

    fn handle_file_event(&self, event: Event) {
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }

        let changed: Vec<&PathBuf> = event
            .paths
            .iter()
            .filter(|p| !is_ignored_path(p, Path::new("")))
            .collect();
        if changed.is_empty() {
            return;
        }

        for path in &changed {
            self.transform_cache.retain(|_, cached| &cached.file_path != *path);
            self.logger.debug(&format!("🔄 Changed: {}", path.display()));
        }

        if self.config.watch {
            self.web_sockets.send(r#"{"type":"reload"}"#);
        }
    }
}

fn is_text_mime(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.starts_with("application/javascript")
        || content_type.starts_with("application/json")
        || content_type.starts_with("image/svg+xml")
}

fn text_response(body: String, content_type: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

fn binary_response(bytes: Vec<u8>, content_type: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from(bytes),
    )
        .into_response()
}

/// Insert the web socket client before `</head>`, or at the top without a head
pub fn inject_web_socket_script(html: &str) -> String {
    let tag = web_socket_script_tag();
    if html.contains(WEB_SOCKET_CLIENT_PATH) {
        return html.to_string();
    }
    match html.find("</head>") {
        Some(head_end) => {
            let mut result = html.to_string();
            result.insert_str(head_end, &tag);
            result
        }
        None => format!("{}{}", tag, html),
    }
}
