//! Chrome-backed page host, used by the command line tool

pub mod config;
pub mod host;
pub mod session;

pub use config::{ConnectionOptions, LaunchOptions};
pub use host::{ChromeHost, TabIds};
pub use session::BrowserSession;
