//! Server-side state: artifacts, share tokens and payment nonces
//!
//! Each ledger is an async trait with an in-memory implementation (dev mode
//! and tests) and a MongoDB one.

pub mod artifacts;
pub mod payments;
pub mod tokens;

pub use artifacts::{ArtifactRepository, MemoryArtifactRepository, MongoArtifactRepository};
pub use payments::{
    spawn_cleanup_task, MemoryPaymentLedger, MongoPaymentLedger, PaymentLedger, PaymentReceipt,
};
pub use tokens::{MemoryTokenLedger, MongoTokenLedger, TokenLedger};
