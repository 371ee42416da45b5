pub mod auth;
pub mod logging;

pub use auth::require_api_key;
pub use logging::{get_tracing_layer, logging_middleware, REQUEST_ID_HEADER};
