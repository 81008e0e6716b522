use crate::utils::{DevkitError, Result};
use axum::body::Body;
use std::path::{Path, PathBuf};

/// Browser paths ending in `/` serve the directory's `index.html`
pub fn get_html_path(path: &str) -> String {
    if path.ends_with('/') {
        format!("{}index.html", path)
    } else {
        path.to_string()
    }
}

/// Request URL without query or hash, percent-decoded
pub fn get_request_browser_path(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let decoded = percent_decode(&url[..end]);
    let path = if decoded.starts_with('/') {
        decoded
    } else {
        format!("/{}", decoded)
    };
    get_html_path(&path)
}

/// Map a request URL onto a file under `root_dir`. `.` and `..` segments are dropped.
pub fn get_request_file_path(url: &str, root_dir: &Path) -> PathBuf {
    let browser_path = get_request_browser_path(url);
    browser_path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .fold(root_dir.to_path_buf(), |path, segment| path.join(segment))
}

/// Collect a response body into a string
pub async fn get_response_body(body: Body) -> Result<String> {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| DevkitError::Server(format!("Failed to read body: {}", e)))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| DevkitError::Server(format!("Response body is not UTF-8: {}", e)))
}

/// Requests for scripts inlined in an HTML page, e.g. `/index.html?inline-script-0&source=/index.html`
pub fn is_inline_script_request(url: &str) -> bool {
    url.contains("inline-script-")
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}
