//! HTTP server: accept loop, routing and response helpers

pub mod http;
pub mod response;

pub use http::{run, serve, AppState};
