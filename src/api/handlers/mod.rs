//! Request handlers and the helpers they share.
//!
//! Failure responses follow one contract everywhere: 401 carries the HTML
//! login form when the caller accepts `text/html` and a plain status line
//! plus `WWW-Authenticate` otherwise; every other failure is a plain status
//! line. Handlers resolve the caller's identity from the session cookie
//! first and fall back to HTTP basic credentials checked against the primary
//! authenticator.

pub mod admin;
pub mod certgen;
pub mod login;
pub mod profile;
pub mod public;
pub mod secondfactor;


use crate::{
    auth,
    signer::CaSigner,
    state::{AUTH_COOKIE_NAME, RuntimeState},
};
use axum::{
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::error;

pub const BASIC_CHALLENGE: &str = "Basic realm=\"User Credentials\"";

pub(crate) const LOGIN_FORM_HTML: &str = r#"<html>
    <head>
        <meta charset="UTF-8">
        <title>Login</title>
    </head>
    <body>
        <form enctype="application/x-www-form-urlencoded" action="/api/v0/login" method="post">
            <p>Username: <input type="text" name="username" size="18"></p>
            <p>Password: <input type="password" name="password" size="18"></p>
            <p><input type="submit" value="Submit"></p>
        </form>
    </body>
</html>
"#;

/// Whether the caller prefers HTML. JSON is assumed by default.
pub(crate) fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .any(|value| value.to_str().is_ok_and(|s| s.contains("text/html")))
}

/// Build a failure response honoring the content negotiation contract.
pub(crate) fn failure_response(headers: &HeaderMap, status: StatusCode, message: &str) -> Response {
    let reason = status.canonical_reason().unwrap_or("");
    let body = if message.is_empty() {
        format!("{} {reason}\n", status.as_u16())
    } else {
        format!("{} {reason} {message}\n", status.as_u16())
    };

    if status == StatusCode::UNAUTHORIZED {
        if wants_html(headers) {
            return (status, Html(LOGIN_FORM_HTML)).into_response();
        }
        return (
            status,
            [(header::WWW_AUTHENTICATE, BASIC_CHALLENGE)],
            body,
        )
            .into_response();
    }

    (status, body).into_response()
}

/// Enforce the sealed gate: every issuing path requires an installed signer.
pub(crate) fn require_signer(
    state: &RuntimeState,
    headers: &HeaderMap,
) -> Result<Arc<CaSigner>, Response> {
    state.signer().ok_or_else(|| {
        error!("signer not loaded");
        failure_response(headers, StatusCode::INTERNAL_SERVER_ERROR, "")
    })
}

/// Resolve the caller's identity: session cookie first, HTTP basic second.
///
/// A cookie that is present but unknown or expired is a failure; there is no
/// fallback from a bad cookie to basic credentials.
///
/// # Errors
/// Returns the response to send when the caller is not authenticated.
pub(crate) async fn check_auth(
    state: &RuntimeState,
    headers: &HeaderMap,
) -> Result<String, Response> {
    if let Some(cookie) = session_cookie_value(headers) {
        return match state.session_username(&cookie) {
            Some(username) => Ok(username),
            None => Err(failure_response(headers, StatusCode::UNAUTHORIZED, "")),
        };
    }

    let Some((username, password)) = basic_credentials(headers) else {
        return Err(failure_response(headers, StatusCode::UNAUTHORIZED, ""));
    };

    match auth::verify_password(&state.config, &username, &password).await {
        Ok(true) => Ok(username),
        Ok(false) => Err(failure_response(headers, StatusCode::UNAUTHORIZED, "")),
        Err(err) => {
            error!("primary authentication failed: {err:#}");
            Err(failure_response(
                headers,
                StatusCode::INTERNAL_SERVER_ERROR,
                "",
            ))
        }
    }
}

/// The `auth_cookie` value, if the request carries one.
pub(crate) fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(header::COOKIE) {
        let value = header.to_str().ok()?;
        for pair in value.split(';') {
            let trimmed = pair.trim();
            let mut parts = trimmed.splitn(2, '=');
            let key = parts.next()?.trim();
            let val = parts.next()?.trim();
            if key == AUTH_COOKIE_NAME {
                return Some(val.to_string());
            }
        }
    }
    None
}

/// Parse HTTP basic credentials from the `Authorization` header.
pub(crate) fn basic_credentials(headers: &HeaderMap) -> Option<(String, SecretString)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value
        .trim()
        .strip_prefix("Basic ")
        .or_else(|| value.trim().strip_prefix("basic "))?;

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    if username.is_empty() {
        return None;
    }

    Some((
        username.to_string(),
        SecretString::from(password.to_string()),
    ))
}

/// Fallback for unrouted paths.
pub async fn not_found(headers: HeaderMap) -> Response {
    failure_response(&headers, StatusCode::NOT_FOUND, "")
}
