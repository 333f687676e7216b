pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use client::{json_headers, ApiClient};
pub use error::AuthError;
pub use types::*;
