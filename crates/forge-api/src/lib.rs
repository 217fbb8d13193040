//! HTTP surfaces: a minimal control surface under `/control` and a strictly
//! read-only monitoring surface under `/monitor`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
