//! HTTP endpoint serving a single mailbox message.
//!
//! `GET /mail/<message url>` with `Authorization: Basic base64(user:pass)`
//! fetches the message through the mailbox adapter using the supplied
//! account (any userinfo stored in the URL is ignored) and returns it as
//! `message/rfc822`, so a search front-end can let users open hits that live
//! in a mailbox.
//!
//! | Outcome | Status |
//! |---|---|
//! | message found | `200` |
//! | no or undecodable credentials | `401` + `WWW-Authenticate: Basic` |
//! | not a mailbox URL, malformed reference | `400` |
//! | message absent | `404` |
//! | anything else | `502` |

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::credentials::AccountPassword;
use crate::document::{DocumentRequest, Fetcher, Retrieval};
use crate::error::FetchError;
use crate::fetch::{AdapterKind, Scheme};

/// Content type of a served message.
pub const MESSAGE_CONTENT_TYPE: &str = "message/rfc822";

const BASIC_CHALLENGE: &str = "Basic realm=\"mail\"";

/// Builds the router exposing `GET /mail/*url`.
#[must_use]
pub fn router(fetcher: Fetcher) -> Router {
    Router::new()
        .route("/mail/*url", get(serve_message))
        .with_state(fetcher)
}

#[instrument(skip(fetcher, headers), fields(url = %url))]
async fn serve_message(
    State(fetcher): State<Fetcher>,
    Path(url): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !Scheme::of(&url).is_some_and(|scheme| scheme.adapter_kind() == AdapterKind::Mailbox) {
        debug!("rejecting non-mailbox URL");
        return (StatusCode::BAD_REQUEST, "not a mailbox message URL").into_response();
    }
    let Some(credentials) = basic_credentials(&headers) else {
        return unauthorized();
    };

    let request = DocumentRequest::new(without_userinfo(&url)).with_credentials(credentials);
    let mut document = match fetcher.open(request).await {
        Ok(Retrieval::Ready(document)) => document,
        Ok(Retrieval::Redirect { to, .. }) => {
            warn!(to = %to, "mailbox document reported a redirect");
            return (StatusCode::BAD_GATEWAY, "unexpected redirect").into_response();
        }
        Err(e) => return error_response(&e),
    };
    let result = document.bytes().await;
    document.dispose();

    match result {
        Ok(bytes) if bytes.is_empty() => {
            info!("message not found");
            (StatusCode::NOT_FOUND, "message not found").into_response()
        }
        Ok(bytes) => {
            debug!(bytes = bytes.len(), "serving message");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, MESSAGE_CONTENT_TYPE)],
                Body::from(bytes),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Extracts `user:password` from a Basic `Authorization` header.
fn basic_credentials(headers: &HeaderMap) -> Option<AccountPassword> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64.decode(token.trim()).ok()?;
    let pair = String::from_utf8(decoded).ok()?;
    AccountPassword::from_basic_pair(&pair)
}

/// Drops any account stored in the URL so the request's credentials apply.
fn without_userinfo(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.username().is_empty() && parsed.password().is_none() {
        return url.to_string();
    }
    if parsed.set_username("").is_err() || parsed.set_password(None).is_err() {
        return url.to_string();
    }
    parsed.to_string()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, BASIC_CHALLENGE)],
        "credentials required",
    )
        .into_response()
}

fn error_response(error: &FetchError) -> Response {
    let status = match error {
        FetchError::MalformedReference { .. } | FetchError::UnsupportedScheme { .. } => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::BAD_GATEWAY,
    };
    warn!(status = status.as_u16(), error = %error, "mail request failed");
    (status, error.to_string()).into_response()
}
