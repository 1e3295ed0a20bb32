//! Session establishment.

use super::{basic_credentials, failure_response, wants_html};
use crate::state::{AUTH_COOKIE_NAME, COOKIE_MAX_AGE, RuntimeState};
use crate::auth;
use axum::{
    extract::{Form, State, rejection::FormRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    username: Option<String>,
    password: Option<String>,
}

/// Verify credentials (HTTP basic or form fields) and mint a session cookie.
///
/// HTML callers are redirected to the profile page; everyone else gets a
/// plain `Success!`.
pub async fn login(
    State(state): State<Arc<RuntimeState>>,
    headers: HeaderMap,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Response {
    if state.signer().is_none() {
        error!("signer not loaded");
        return failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "");
    }

    let form = match form {
        Ok(Form(form)) => form,
        Err(err) => {
            info!("cannot parse login form: {err}");
            return failure_response(&headers, StatusCode::BAD_REQUEST, "Error parsing form");
        }
    };

    // Headers first, then the form.
    let credentials = basic_credentials(&headers).or_else(|| {
        match (form.username, form.password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some((username, SecretString::from(password)))
            }
            _ => None,
        }
    });

    let Some((username, password)) = credentials else {
        return failure_response(&headers, StatusCode::UNAUTHORIZED, "");
    };

    let valid = match auth::verify_password(&state.config, &username, &password).await {
        Ok(valid) => valid,
        Err(err) => {
            error!("primary authentication failed: {err:#}");
            return failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "");
        }
    };

    if !valid {
        info!("invalid login for {username}");
        return failure_response(&headers, StatusCode::UNAUTHORIZED, "");
    }

    let cookie = match state.issue_session(&username) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("cannot issue session: {err:#}");
            return failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "error internal");
        }
    };

    let cookie_header = format!(
        "{AUTH_COOKIE_NAME}={cookie}; Path=/; HttpOnly; Secure; Max-Age={}",
        COOKIE_MAX_AGE.as_secs()
    );

    if wants_html(&headers) {
        return (
            StatusCode::FOUND,
            [
                (header::SET_COOKIE, cookie_header),
                (header::LOCATION, "/profile/".to_string()),
            ],
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie_header)],
        "Success!",
    )
        .into_response()
}
