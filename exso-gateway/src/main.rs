//! Exso Gateway - artifacts, share tokens and payment verification

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use exso_gateway::{config::Args, db::MongoClient, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("exso_gateway={},exso_core={},info", log_level, log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Exso Gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Paywall: {}", args.paywall_path);
    info!("Share token quota: {}", args.share_token_quota);
    info!(
        "Checkout: {}",
        if args.checkout_credentials().is_some() { "configured" } else { "preview" }
    );
    info!("MongoDB: {}", if args.mongodb_uri.is_some() { "configured" } else { "none (in-memory)" });
    info!("======================================");

    // MongoDB is optional; without it every ledger lives in memory
    let mongo = match args.mongodb_uri.as_deref() {
        Some(uri) => match MongoClient::new(uri, &args.mongodb_db).await {
            Ok(client) => {
                info!("MongoDB connected successfully");
                Some(client)
            }
            Err(e) => {
                if args.dev_mode {
                    warn!("MongoDB connection failed (dev mode, continuing in memory): {}", e);
                    None
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        },
        None => {
            warn!("MONGODB_URI not set - artifacts, tokens and payments are kept in memory");
            None
        }
    };

    let state = match mongo {
        Some(ref client) => server::AppState::with_mongo(args, client).await?,
        None => server::AppState::in_memory(args)?,
    };

    server::run(Arc::new(state)).await?;

    Ok(())
}
