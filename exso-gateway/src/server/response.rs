//! Response builders and request body helpers shared by all routes

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::http::response::Builder;
use hyper::{header, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::types::GatewayError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const ALLOW_HEADERS: &str = "Content-Type, X-Payment-Nonce, X-Signature";

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    full_body(Bytes::new())
}

fn with_cors(builder: Builder) -> Builder {
    builder
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", ALLOW_HEADERS)
}

/// Finish a builder; a header that fails to encode becomes a bare 500
fn finish(builder: Builder, body: BoxBody) -> Response<BoxBody> {
    builder.body(body).unwrap_or_else(|e| {
        error!("Failed to build response: {}", e);
        let mut response = Response::new(empty_body());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    json_response_with(status, body, &[])
}

/// JSON response with extra headers
pub fn json_response_with<T: Serialize>(
    status: StatusCode,
    body: &T,
    headers: &[(&str, String)],
) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut builder = with_cors(Response::builder().status(status))
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    finish(builder, full_body(json))
}

pub fn error_response(err: GatewayError) -> Response<BoxBody> {
    let status = err.status_code();
    if status.is_server_error() {
        warn!(code = err.code(), "Request failed: {}", err);
    }
    let (status, body) = err.into_status_code_and_body();
    finish(
        with_cors(Response::builder().status(status)).header(header::CONTENT_TYPE, "application/json"),
        full_body(body),
    )
}

pub fn redirect_response(status: StatusCode, location: &str) -> Response<BoxBody> {
    finish(
        with_cors(Response::builder().status(status))
            .header(header::LOCATION, location)
            .header(header::CACHE_CONTROL, "no-store"),
        empty_body(),
    )
}

/// CORS preflight response
pub fn preflight_response() -> Response<BoxBody> {
    finish(
        with_cors(Response::builder().status(StatusCode::NO_CONTENT))
            .header("Access-Control-Max-Age", "86400"),
        empty_body(),
    )
}

pub fn not_found_response(path: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "error": "Not Found",
            "path": path,
        }),
    )
}

/// Read the whole body, refusing anything over `limit` bytes
pub async fn read_body(req: Request<Incoming>, limit: usize) -> Result<Bytes, GatewayError> {
    Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| GatewayError::Http(format!("Failed to read body: {}", e)))
}

pub async fn parse_json_body<T: DeserializeOwned>(
    req: Request<Incoming>,
    limit: usize,
) -> Result<T, GatewayError> {
    let bytes = read_body(req, limit).await?;
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// Query string into `T`; unparseable queries give the default
pub fn parse_query<T: DeserializeOwned + Default>(query: Option<&str>) -> T {
    serde_urlencoded::from_str(query.unwrap_or("")).unwrap_or_default()
}

/// Single path segment after `prefix` (and before `suffix`), percent-decoded
pub fn path_segment(path: &str, prefix: &str, suffix: &str) -> Option<String> {
    let raw = path.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if raw.is_empty() || raw.contains('/') {
        return None;
    }
    urlencoding::decode(raw).ok().map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segment() {
        assert_eq!(path_segment("/artifact/abc", "/artifact/", ""), Some("abc".into()));
        assert_eq!(
            path_segment("/artifact/abc/share", "/artifact/", "/share"),
            Some("abc".into())
        );
        assert_eq!(path_segment("/artifact/a%20b", "/artifact/", ""), Some("a b".into()));
        assert_eq!(path_segment("/artifact/", "/artifact/", ""), None);
        assert_eq!(path_segment("/artifact/a/b", "/artifact/", ""), None);
        assert_eq!(path_segment("/share/abc", "/artifact/", ""), None);
    }

    #[test]
    fn test_parse_query_defaults_on_garbage() {
        #[derive(serde::Deserialize, Default, PartialEq, Debug)]
        struct Q {
            k: Option<String>,
        }
        assert_eq!(parse_query::<Q>(Some("k=tok")), Q { k: Some("tok".into()) });
        assert_eq!(parse_query::<Q>(None), Q::default());
    }

    #[test]
    fn test_error_response_status() {
        let response = error_response(GatewayError::InvariantViolation("x".into()));
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
    }

    #[test]
    fn test_redirect_response() {
        let response = redirect_response(StatusCode::SEE_OTHER, "/pricing");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/pricing");
    }
}
