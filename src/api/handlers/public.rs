//! Unauthenticated paths: the login form and the CA certificate.

use super::{LOGIN_FORM_HTML, failure_response, require_signer};
use crate::state::RuntimeState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;
use x509_cert::der::{EncodePem, pem::LineEnding};

pub async fn login_form(State(state): State<Arc<RuntimeState>>, headers: HeaderMap) -> Response {
    if state.signer().is_none() {
        error!("signer not loaded");
        return failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "");
    }

    Html(LOGIN_FORM_HTML).into_response()
}

/// Serve the CA certificate as PEM so callers can extend trust to it.
pub async fn x509_ca(State(state): State<Arc<RuntimeState>>, headers: HeaderMap) -> Response {
    let signer = match require_signer(&state, &headers) {
        Ok(signer) => signer,
        Err(response) => return response,
    };

    let pem = match signer.ca_cert().to_pem(LineEnding::LF) {
        Ok(pem) => pem,
        Err(err) => {
            error!("cannot encode CA certificate: {err}");
            return failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "");
        }
    };

    (
        [(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"caCert.pem\"",
        )],
        pem,
    )
        .into_response()
}
