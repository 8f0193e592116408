//! Database layer
//!
//! MongoDB storage for artifacts, share tokens and payment nonces.

pub mod mongo;
pub mod schemas;

pub use mongo::{MongoClient, MongoCollection};
pub use schemas::{ArtifactDoc, Metadata, PaymentNonceDoc, ShareTokenDoc};
