//! HTTP server implementation
//!
//! hyper http1 with TokioIo; one task per connection.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::db::MongoClient;
use crate::ledger::{
    spawn_cleanup_task, ArtifactRepository, MemoryArtifactRepository, MemoryPaymentLedger,
    MemoryTokenLedger, MongoArtifactRepository, MongoPaymentLedger, MongoTokenLedger,
    PaymentLedger, TokenLedger,
};
use crate::payments::CheckoutClient;
use crate::routes;
use crate::server::response::{not_found_response, path_segment, preflight_response, BoxBody};
use crate::types::GatewayError;

const PAYMENT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub artifacts: Arc<dyn ArtifactRepository>,
    pub tokens: Arc<dyn TokenLedger>,
    pub payments: Arc<dyn PaymentLedger>,
    /// Present only when provider credentials are configured
    pub checkout: Option<CheckoutClient>,
    /// "mongodb" or "memory", reported by /health
    pub backend: &'static str,
}

impl AppState {
    pub fn new(
        args: Args,
        artifacts: Arc<dyn ArtifactRepository>,
        tokens: Arc<dyn TokenLedger>,
        payments: Arc<dyn PaymentLedger>,
    ) -> Result<Self, GatewayError> {
        let checkout = match args.checkout_credentials() {
            Some((secret_key, price_id)) => Some(CheckoutClient::new(
                &args.checkout_api_url,
                secret_key,
                price_id,
                args.request_timeout(),
            )?),
            None => None,
        };

        Ok(Self {
            args,
            artifacts,
            tokens,
            payments,
            checkout,
            backend: "memory",
        })
    }

    /// AppState with in-memory ledgers (dev mode, tests)
    pub fn in_memory(args: Args) -> Result<Self, GatewayError> {
        let tokens = MemoryTokenLedger::new(args.share_token_quota, args.issue_policy());
        let payments = MemoryPaymentLedger::new(args.nonce_ttl());
        Self::new(
            args,
            Arc::new(MemoryArtifactRepository::new()),
            Arc::new(tokens),
            Arc::new(payments),
        )
    }

    /// AppState with MongoDB-backed ledgers
    pub async fn with_mongo(args: Args, mongo: &MongoClient) -> Result<Self, GatewayError> {
        let artifacts = MongoArtifactRepository::new(mongo).await?;
        let tokens = MongoTokenLedger::new(mongo, args.share_token_quota, args.issue_policy()).await?;
        let payments = MongoPaymentLedger::new(mongo, args.nonce_ttl()).await?;

        let mut state = Self::new(
            args,
            Arc::new(artifacts),
            Arc::new(tokens),
            Arc::new(payments),
        )?;
        state.backend = "mongodb";
        Ok(state)
    }
}

/// Bind the configured address and serve until the process exits
pub async fn run(state: Arc<AppState>) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Exso gateway listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - webhook secret optional");
    }
    if state.checkout.is_none() {
        warn!("Checkout provider not configured - /checkout answers in preview mode");
    }

    spawn_cleanup_task(Arc::clone(&state.payments), PAYMENT_CLEANUP_INTERVAL);
    info!(
        "Share tokens allow {} opens; payment nonces live {}s ({} backend)",
        state.tokens.quota(),
        state.args.payment_nonce_ttl_secs,
        state.backend
    );

    serve(listener, state).await
}

/// Accept loop over an already-bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), GatewayError> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/health") | (Method::GET, "/healthz") => routes::health_check(&state),

        (Method::GET, "/version") => routes::version_info(),

        // ====================================================================
        // Artifacts and share tokens
        // ====================================================================
        (Method::POST, "/artifact") => routes::handle_publish_artifact(state, req).await,

        (Method::POST, p) if p.starts_with("/artifact/") && p.ends_with("/share") => {
            match path_segment(p, "/artifact/", "/share") {
                Some(exso_id) => routes::handle_issue_share(state, &exso_id).await,
                None => not_found_response(p),
            }
        }

        (Method::GET, p) if p.starts_with("/artifact/") => match path_segment(p, "/artifact/", "") {
            Some(exso_id) => {
                routes::handle_get_artifact(state, &exso_id, query.as_deref(), req.headers()).await
            }
            None => not_found_response(p),
        },

        (Method::GET, p) if p.starts_with("/share/") => match path_segment(p, "/share/", "") {
            Some(token) => routes::handle_peek_share(state, &token).await,
            None => not_found_response(p),
        },

        // Short share links
        (Method::GET, p) if p == "/x" || p.starts_with("/x/") => {
            routes::handle_short_link(p, query.as_deref())
        }

        // ====================================================================
        // Payments
        // ====================================================================
        (Method::POST, "/checkout") => routes::handle_checkout(state, req).await,

        (Method::GET, "/payment/verify") => routes::handle_verify(state, query.as_deref()).await,

        (Method::POST, "/webhook/payment") => routes::handle_webhook(state, req).await,

        _ => not_found_response(&path),
    };

    Ok(response)
}
