use crate::write;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request as HttpRequest, StatusCode};
use devkit::dev_server::{
    get_response_body, App, Context, DevServer, DevServerCoreConfig, Plugin, ResolveOptions,
    ServeResult, TracingLogger, TransformResult,
};
use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

struct VirtualModulePlugin;

#[async_trait]
impl Plugin for VirtualModulePlugin {
    fn name(&self) -> &str {
        "virtual-module"
    }

    async fn serve(&self, context: &Context) -> devkit::utils::Result<Option<ServeResult>> {
        Ok((context.path == "/virtual.js").then(|| {
            ServeResult::new("export default 42;")
                .with_content_type("application/javascript; charset=utf-8")
        }))
    }
}

struct BannerPlugin;

#[async_trait]
impl Plugin for BannerPlugin {
    fn name(&self) -> &str {
        "banner"
    }

    async fn transform(
        &self,
        context: &Context,
        body: &str,
    ) -> devkit::utils::Result<Option<TransformResult>> {
        if !context.is_javascript() {
            return Ok(None);
        }
        Ok(Some(TransformResult {
            body: Some(format!("/* banner */\n{}", body)),
            content_type: None,
        }))
    }
}

struct BareImportPlugin;

#[async_trait]
impl Plugin for BareImportPlugin {
    fn name(&self) -> &str {
        "bare-imports"
    }

    async fn resolve_import(
        &self,
        source: &str,
        _context: &Context,
        _options: &ResolveOptions,
    ) -> devkit::utils::Result<Option<String>> {
        Ok((source == "lit").then(|| "/node_modules/.prebundled_modules/lit.js".to_string()))
    }
}

fn server(root: &Path, configure: impl FnOnce(&mut DevServerCoreConfig)) -> DevServer {
    let mut config = DevServerCoreConfig::new(root.to_path_buf());
    configure(&mut config);
    DevServer::new(config, Arc::new(TracingLogger::new()))
}

async fn get(app: App, uri: &str) -> (StatusCode, String, String) {
    let response = app
        .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let body = get_response_body(response.into_body()).await.unwrap();
    (status, content_type, body)
}

#[tokio::test]
async fn test_serves_static_files_and_404() {
    let temp = tempdir().unwrap();
    write(temp.path(), "src/data.json", r#"{"ok":true}"#);
    let server = server(temp.path(), |_| {});

    let (status, content_type, body) = get(server.router(), "/src/data.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("application/json"));
    assert_eq!(body, r#"{"ok":true}"#);

    let (status, _, _) = get(server.router(), "/missing.js").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_html_gets_web_socket_client() {
    let temp = tempdir().unwrap();
    write(temp.path(), "index.html", "<html><head></head><body></body></html>");

    let (_, content_type, body) = get(server(temp.path(), |_| {}).router(), "/index.html").await;
    assert!(content_type.starts_with("text/html"));
    assert!(body.contains("/__web-dev-server__web-socket.js\"></script></head>"));

    let disabled = server(temp.path(), |c| c.inject_web_socket = false);
    let (_, _, body) = get(disabled.router(), "/index.html").await;
    assert_eq!(body, "<html><head></head><body></body></html>");

    let (status, _, script) = get(disabled.router(), "/__web-dev-server__web-socket.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(script.contains("new WebSocket"));
}

#[tokio::test]
async fn test_plugins_serve_transform_and_resolve_imports() {
    let temp = tempdir().unwrap();
    write(
        temp.path(),
        "src/main.js",
        "import { html } from 'lit';\nimport './local.js';\nconst m = import(\"lit\");",
    );
    let server = server(temp.path(), |c| {
        c.plugins = vec![
            Arc::new(VirtualModulePlugin),
            Arc::new(BannerPlugin),
            Arc::new(BareImportPlugin),
        ];
    });

    let (status, content_type, body) = get(server.router(), "/virtual.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("application/javascript"));
    assert_eq!(body, "/* banner */\nexport default 42;");

    let (_, _, body) = get(server.router(), "/src/main.js").await;
    assert!(body.starts_with("/* banner */\n"));
    assert!(body.contains("from '/node_modules/.prebundled_modules/lit.js'"));
    assert!(body.contains("import './local.js'"));
    assert!(body.contains("import(\"/node_modules/.prebundled_modules/lit.js\")"));
}

#[tokio::test]
async fn test_import_rewrite_skips_strings_and_comments() {
    let temp = tempdir().unwrap();
    write(
        temp.path(),
        "src/main.js",
        "// import { html } from 'lit';\nconst doc = \"import('lit')\";\nexport { html } from 'lit';",
    );
    let server = server(temp.path(), |c| c.plugins = vec![Arc::new(BareImportPlugin)]);

    let (status, _, body) = get(server.router(), "/src/main.js").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        "// import { html } from 'lit';\nconst doc = \"import('lit')\";\n\
         export { html } from '/node_modules/.prebundled_modules/lit.js';"
    );
}

#[tokio::test]
async fn test_syntax_error_in_served_module() {
    let temp = tempdir().unwrap();
    write(temp.path(), "src/broken.js", "import { a } from 'lit';\nconst = 1;");
    let server = server(temp.path(), |c| c.plugins = vec![Arc::new(BareImportPlugin)]);

    let (status, _, body) = get(server.router(), "/src/broken.js").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("broken.js:2:"), "{}", body);
}

#[tokio::test]
async fn test_mime_mapping_and_base_path() {
    let temp = tempdir().unwrap();
    write(temp.path(), "src/app.ts", "export const a: number = 1;");
    let server = server(temp.path(), |c| {
        c.base_path = Some("/app".to_string());
        c.mime_types.insert("**/*.ts".to_string(), "js".to_string());
    });

    let (status, content_type, body) = get(server.router(), "/app/src/app.ts").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("application/javascript"));
    assert_eq!(body, "export const a: number = 1;");
}

#[tokio::test]
async fn test_rejects_non_get_requests() {
    let temp = tempdir().unwrap();
    let response = server(temp.path(), |_| {})
        .router()
        .oneshot(
            HttpRequest::builder()
                .method("POST")
                .uri("/index.html")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_web_socket_messages_both_ways() {
    let temp = tempdir().unwrap();
    let server = server(temp.path(), |c| {
        c.hostname = "127.0.0.1".to_string();
        c.port = 0;
    });
    let addr = server.start().await.unwrap();
    let mut incoming = server.web_sockets().subscribe();

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/wds", addr))
        .await
        .unwrap();

    for _ in 0..50 {
        if server.web_sockets().client_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.web_sockets().send_import("/hot.js"), 1);

    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
    assert_eq!(value["type"], "import");
    assert_eq!(value["data"]["importPath"], "/hot.js");

    socket
        .send(Message::Text(r#"{"type":"ping","n":1}"#.to_string()))
        .await
        .unwrap();
    let data = tokio::time::timeout(Duration::from_secs(5), incoming.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(data.kind, "ping");
    assert_eq!(data.data["n"], 1);
    assert!(!data.client_id.is_empty());

    server.stop().await.unwrap();
}

#[test]
fn test_third_party_reexports() {
    let _: Option<axum::Router> = None::<App>;
    let _: Option<tokio::net::TcpListener> = None::<devkit::dev_server::Server>;
    let _: Option<notify::RecommendedWatcher> = None::<devkit::dev_server::FsWatcher>;
    let _: Option<axum::extract::ws::WebSocket> = None::<devkit::dev_server::WebSocket>;
}
