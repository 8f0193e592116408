//! Short share links: `/x/{id}?k=token` → `/exso/{id}?k=token`

use hyper::{Response, StatusCode};
use serde::Deserialize;

use crate::server::response::{parse_query, redirect_response, BoxBody};

#[derive(Debug, Default, Deserialize)]
struct ShortLinkQuery {
    k: Option<String>,
}

/// Playback page path for an artifact, with the token if any
pub fn playback_path(exso_id: &str, token: Option<&str>) -> String {
    let mut path = format!("/exso/{}", urlencoding::encode(exso_id));
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        path.push_str("?k=");
        path.push_str(&urlencoding::encode(token));
    }
    path
}

/// The short form handed to senders
pub fn short_link(exso_id: &str, token: Option<&str>) -> String {
    playback_path(exso_id, token).replacen("/exso/", "/x/", 1)
}

/// GET /x/{id}
pub fn handle_short_link(path: &str, query: Option<&str>) -> Response<BoxBody> {
    let raw_id = path.strip_prefix("/x").unwrap_or("").trim_start_matches('/');
    let exso_id = urlencoding::decode(raw_id)
        .map(|s| s.into_owned())
        .unwrap_or_default();
    if exso_id.is_empty() {
        return redirect_response(StatusCode::FOUND, "/");
    }

    let query: ShortLinkQuery = parse_query(query);
    redirect_response(StatusCode::FOUND, &playback_path(&exso_id, query.k.as_deref()))
}
