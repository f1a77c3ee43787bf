pub mod config;
pub mod error;
pub mod paths;
pub mod server;
pub mod upload;

pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{build_router, AppState};
