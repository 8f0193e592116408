//! Exso Gateway - server side of Exso experiences
//!
//! Stores published artifacts, gates every artifact fetch behind a share
//! token or a verified payment, and talks to the payment provider.
//!
//! ## Services
//!
//! - **Artifacts**: publish and gated fetch (`/artifact`)
//! - **Share tokens**: limited-use links (`/artifact/{id}/share`, `/share/{token}`, `/x/{id}`)
//! - **Payments**: hosted checkout, signed webhook, nonce verification
//! - **Client**: typed access to all of the above plus the tiered artifact resolver

pub mod client;
pub mod config;
pub mod db;
pub mod ledger;
pub mod payments;
pub mod routes;
pub mod server;
pub mod types;

pub use client::{ArtifactResolver, GatewayClient};
pub use config::Args;
pub use server::{run, serve, AppState};
pub use types::{GatewayError, Result};
