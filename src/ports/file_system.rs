use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Error type for file system operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FileSystemError {
    /// Error when encountering an IO issue
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error when path is invalid
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for file system operations
pub type FileSystemResult<T> = Result<T, FileSystemError>;

/// FileSystem defines the port (interface) for serving the front-end bundle
pub trait FileSystem: Send + Sync + 'static {
    /// Serve the file named by the request path from `root`, falling back to `index_file`
    /// when no such file exists (client-side routing).
    ///
    /// # Arguments
    /// * `root` - The bundle directory
    /// * `index_file` - Entry document relative to `root`
    /// * `req` - The incoming HTTP request
    fn serve_spa(
        &self,
        root: &str,
        index_file: &str,
        req: Request<AxumBody>,
    ) -> impl std::future::Future<Output = FileSystemResult<Response<AxumBody>>> + Send;
}
