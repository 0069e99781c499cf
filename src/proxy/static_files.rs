use crate::config::Config;
use crate::utils::path::path_only;
use hyper::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Body, Method, Response, StatusCode};
use log::{debug, trace};
use std::path::{Path, PathBuf};

/// Serves requests that no proxy rule matched from a directory on disk
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index_file: String,
    spa_fallback: bool,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, index_file: impl Into<String>, spa_fallback: bool) -> Self {
        Self { root: root.into(), index_file: index_file.into(), spa_fallback }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.get_static_dir(), config.get_index_file(), config.is_spa_fallback())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve `path_and_query` from the root directory.
    ///
    /// Unknown extension-less paths fall back to the index file when SPA fallback is on,
    /// so client-side routes survive a page reload.
    pub async fn serve(&self, method: &Method, path_and_query: &str) -> Response<Body> {
        if *method != Method::GET && *method != Method::HEAD {
            return not_found();
        }
        let Some(relative) = self.resolve(path_only(path_and_query)) else {
            debug!("Rejected static path {}", path_and_query);
            return not_found();
        };

        let file_path = self.root.join(&relative);
        match tokio::fs::read(&file_path).await {
            Ok(content) => file_response(method, &file_path, content),
            Err(_) if self.spa_fallback && !has_extension(&relative) => {
                let index_path = self.root.join(&self.index_file);
                trace!("{} not found, falling back to {}", file_path.display(), index_path.display());
                match tokio::fs::read(&index_path).await {
                    Ok(content) => file_response(method, &index_path, content),
                    Err(_) => not_found(),
                }
            }
            Err(e) => {
                trace!("Static file {} unavailable: {}", file_path.display(), e);
                not_found()
            }
        }
    }

    // Relative file path for a request path, None for anything escaping the root
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let mut relative = PathBuf::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." || segment == "." || segment.contains('\\') || segment.contains(':') {
                return None;
            }
            relative.push(segment);
        }
        if relative.as_os_str().is_empty() || path.ends_with('/') {
            relative.push(&self.index_file);
        }
        Some(relative)
    }
}

fn has_extension(relative: &Path) -> bool {
    relative.extension().is_some()
}

fn file_response(method: &Method, file_path: &Path, content: Vec<u8>) -> Response<Body> {
    let mime_type = mime_guess::from_path(file_path).first_or_octet_stream().to_string();
    debug!("Serving {} ({} bytes)", file_path.display(), content.len());
    let length = content.len();
    let body = if *method == Method::HEAD { Body::empty() } else { Body::from(content) };
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, mime_type)
        .header(CONTENT_LENGTH, length)
        .header(CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap_or_else(|_| not_found())
}

pub fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::from("Not Found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response.headers_mut().insert(CONTENT_TYPE, hyper::header::HeaderValue::from_static("text/plain"));
    response
}
