//! Development server surface.
//!
//! Third-party building blocks are re-exported under the names the rest of
//! the crate (and its users) know them by, next to the server's own types.

pub mod build_adapter;
pub mod config;
pub mod context;
pub mod errors;
pub mod logger;
pub mod plugin;
pub mod server;
pub mod utils;
pub mod websockets;

// Third-party pieces
pub use axum::extract::ws::WebSocket;
pub use axum::extract::Request;
pub use axum::middleware::Next;
pub use axum::Router as App;
pub use notify::RecommendedWatcher as FsWatcher;
pub use tokio::net::TcpListener as Server;

pub use build_adapter::BuildPluginAdapter;
pub use config::{DevServerCoreConfig, MimeTypeMappings, Middleware};
pub use context::Context;
pub use errors::{PluginError, PluginSyntaxError};
pub use logger::{ErrorWithLocation, Logger, TracingLogger};
pub use plugin::{Plugin, ResolveOptions, ServeResult, ServerStartParams, TransformResult};
pub use server::DevServer;
pub use utils::{
    get_html_path, get_request_browser_path, get_request_file_path, get_response_body,
    is_inline_script_request,
};
pub use websockets::{WebSocketData, WebSocketsManager};
