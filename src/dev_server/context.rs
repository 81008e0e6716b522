use super::utils::{get_request_browser_path, get_request_file_path};
use axum::http::{HeaderMap, Method};
use std::path::PathBuf;

/// What plugins see of a request while it moves through the pipeline.
#[derive(Debug, Clone)]
pub struct Context {
    pub method: Method,
    /// Request URL with the base path removed, query included
    pub url: String,
    /// Decoded browser path, `index.html` appended for directories
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    /// Set once the pipeline has decided the response type
    pub content_type: Option<String>,
    pub root_dir: PathBuf,
}

impl Context {
    pub fn new(method: Method, url: &str, headers: HeaderMap, root_dir: PathBuf) -> Self {
        let query = url
            .split_once('?')
            .map(|(_, q)| q.split('#').next().unwrap_or("").to_string());

        Self {
            method,
            url: url.to_string(),
            path: get_request_browser_path(url),
            query,
            headers,
            content_type: None,
            root_dir,
        }
    }

    /// File this request maps to under the root directory
    pub fn file_path(&self) -> PathBuf {
        get_request_file_path(&self.path, &self.root_dir)
    }

    pub fn is_javascript(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/javascript") || ct.starts_with("text/javascript"))
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/html"))
    }
}
