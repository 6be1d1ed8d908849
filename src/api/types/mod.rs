//! Wire types shared by the HTTP surface

pub mod error;
pub mod json;

pub use error::{ApiError, ApiErrorCode, ApiErrorResponse, RateLimitDetails};
pub use json::Json;
