use std::path::Path;

use axum::body::Body as AxumBody;
use eyre::WrapErr;
use http_body_util::BodyExt;
use hyper::{Request, Response};
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

use crate::ports::file_system::{FileSystem, FileSystemError, FileSystemResult};

/// Serves the front-end bundle with tower-http: files by path, the index document for
/// everything else.
#[derive(Debug, Default, Clone)]
pub struct FileSystemAdapter;

impl FileSystemAdapter {
    pub fn new() -> Self {
        Self
    }

    /// `true` when `root` exists and is a directory.
    pub fn bundle_present(root: &str) -> bool {
        Path::new(root).is_dir()
    }
}

impl FileSystem for FileSystemAdapter {
    async fn serve_spa(
        &self,
        root: &str,
        index_file: &str,
        req: Request<AxumBody>,
    ) -> FileSystemResult<Response<AxumBody>> {
        if index_file.contains("..") {
            return Err(FileSystemError::InvalidPath(format!(
                "Index file escapes root: {index_file}"
            )));
        }
        let index = Path::new(root).join(index_file.trim_start_matches('/'));

        let serve_dir = ServeDir::new(root)
            .append_index_html_on_directories(true)
            .fallback(ServeFile::new(index));

        let response = serve_dir
            .oneshot(req)
            .await
            .wrap_err("ServeDir failed to serve file")
            .map_err(|e| {
                FileSystemError::IoError(std::io::Error::other(format!("ServeDir error: {e}")))
            })?;

        let (parts, tower_body) = response.into_parts();
        let axum_body = AxumBody::new(tower_body.map_err(|e| {
            tracing::error!("Error reading static file body: {}", e);
            axum::Error::new(e)
        }));

        Ok(Response::from_parts(parts, axum_body))
    }
}

#[cfg(test)]
mod tests {
    use hyper::{Method, StatusCode};
    use tempfile::TempDir;

    use super::*;

    async fn create_test_file(dir: &TempDir, path: &str, content: &str) -> std::io::Result<()> {
        let full_path = dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(full_path, content).await
    }

    async fn bundle() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        create_test_file(&temp_dir, "index.html", "<app-root></app-root>")
            .await
            .unwrap();
        create_test_file(&temp_dir, "assets/main.js", "console.log(1)")
            .await
            .unwrap();
        temp_dir
    }

    async fn get(root: &str, uri: &str) -> (StatusCode, String) {
        let req = Request::builder()
            .uri(uri)
            .body(AxumBody::empty())
            .unwrap();
        let response = FileSystemAdapter::new()
            .serve_spa(root, "index.html", req)
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        let dir = bundle().await;
        let (status, body) = get(dir.path().to_str().unwrap(), "/assets/main.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log(1)");
    }

    #[tokio::test]
    async fn test_unknown_path_falls_back_to_index() {
        let dir = bundle().await;
        let root = dir.path().to_str().unwrap();

        for uri in ["/", "/games/2048", "/proxy/thingproxy/x"] {
            let (status, body) = get(root, uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body, "<app-root></app-root>", "{uri}");
        }
    }

    #[tokio::test]
    async fn test_missing_bundle_is_not_found() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("dist");
        let (status, _) = get(root.to_str().unwrap(), "/anything").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!FileSystemAdapter::bundle_present(root.to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_non_get_is_rejected() {
        let dir = bundle().await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/index.html")
            .body(AxumBody::empty())
            .unwrap();
        let response = FileSystemAdapter::new()
            .serve_spa(dir.path().to_str().unwrap(), "index.html", req)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_index_outside_root_is_refused() {
        let dir = bundle().await;
        let req = Request::builder()
            .uri("/")
            .body(AxumBody::empty())
            .unwrap();
        let result = FileSystemAdapter::new()
            .serve_spa(dir.path().to_str().unwrap(), "../secret.html", req)
            .await;
        assert!(matches!(result, Err(FileSystemError::InvalidPath(_))));
    }
}
