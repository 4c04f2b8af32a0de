pub mod api;
pub mod error;
pub mod middleware;
pub mod server;

pub use error::ApiError;
pub use middleware::AuthConfig;
pub use server::{AppState, GatewayServer};
