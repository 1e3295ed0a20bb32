//! Administrative unseal endpoint.
//!
//! The only path that operates while the signer is sealed. Callers must
//! arrive over the front door with a client certificate chain that verified
//! against the configured client CA bundle; any user with a valid
//! certificate may unseal.

use super::failure_response;
use crate::{
    api::ClientIdentity,
    state::{RuntimeState, UnsealOutcome},
};
use axum::{
    Extension,
    extract::{Form, State, rejection::FormRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
pub struct InjectForm {
    ssh_ca_password: Option<String>,
}

pub async fn inject(
    State(state): State<Arc<RuntimeState>>,
    identity: Option<Extension<ClientIdentity>>,
    headers: HeaderMap,
    form: Result<Form<InjectForm>, FormRejection>,
) -> Response {
    // Only TLS client certificates are acceptable here; no other authn
    // mechanism applies.
    let Some(Extension(identity)) = identity else {
        error!("unseal request without TLS connection state");
        return failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "");
    };

    if !identity.verified {
        warn!("unseal request without a verified client certificate chain");
        return failure_response(&headers, StatusCode::FORBIDDEN, "");
    }

    let client_name = identity.common_name.as_deref().unwrap_or("<unknown>");
    info!("got unseal connection from {client_name}");

    let passphrase = match form {
        Ok(Form(InjectForm {
            ssh_ca_password: Some(password),
        })) => SecretString::from(password),
        _ => {
            return failure_response(
                &headers,
                StatusCode::BAD_REQUEST,
                "Invalid Post, missing data",
            );
        }
    };

    match state.unseal(&passphrase) {
        Ok(UnsealOutcome::Installed) => {
            info!("signer unsealed by {client_name}");
            (StatusCode::OK, "OK\n").into_response()
        }
        Ok(UnsealOutcome::AlreadyUnsealed) => {
            warn!("unseal attempt against an already unsealed signer");
            failure_response(
                &headers,
                StatusCode::CONFLICT,
                "signer already unlocked",
            )
        }
        Err(err) => {
            error!("unseal failed: {err:#}");
            failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "")
        }
    }
}
