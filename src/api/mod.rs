//! REST access to the instance under test

mod client;
pub mod result;

pub use client::{ApiResponse, ApiSession};
pub use result::normalize_result;
