//! Browser automation over the W3C WebDriver protocol

mod client;
mod driver;
pub mod locator;
pub mod types;

pub use client::{is_stale, BrowserSession, Found};
pub use driver::DriverProcess;
pub use locator::{Locator, NamePattern};
pub use types::ElementRef;
