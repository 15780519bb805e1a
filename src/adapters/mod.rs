pub mod file_system;
pub mod http_client;
pub mod http_handler;
pub mod middleware;
pub mod network;
pub mod server;

/// Re-export commonly used types from adapters
pub use file_system::FileSystemAdapter;
pub use http_client::HttpClientAdapter;
pub use http_handler::HttpHandler;
pub use middleware::*;
pub use network::SystemInterfaces;
pub use server::{AxumServer, router};
