mod auth;
mod error_handler;

pub use auth::{auth_middleware, viewer_middleware};
pub use error_handler::log_errors;
