//! HTTP front door: request routing and TLS termination.
//!
//! The router dispatches to the handlers in [`handlers`]; the serve loop
//! terminates TLS itself so the identity presented in a verified client
//! certificate chain can be attached to every request on that connection.

pub mod handlers;

use crate::{state::RuntimeState, tls};
use anyhow::{Context, Result};
use axum::{
    Router,
    extract::Request,
    routing::{get, post},
};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::CertificateDer;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::Service;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use x509_cert::der::Decode;

/// What the TLS layer learned about the peer. Present on every request served
/// over the front door; a missing extension means the request did not arrive
/// through it.
#[derive(Debug, Clone, Default)]
pub struct ClientIdentity {
    /// Subject common name of the first verified client certificate.
    pub common_name: Option<String>,
    /// Whether the peer presented a certificate chain that verified against
    /// the client CA bundle.
    pub verified: bool,
}

impl ClientIdentity {
    fn from_peer_certificates(peer: Option<&[CertificateDer<'_>]>) -> Self {
        // rustls only completes the handshake when a presented chain
        // verifies, so any peer certificate here is a verified one.
        match peer.and_then(<[_]>::first) {
            Some(cert) => Self {
                common_name: subject_common_name(cert),
                verified: true,
            },
            None => Self::default(),
        }
    }
}

fn subject_common_name(cert: &CertificateDer<'_>) -> Option<String> {
    let cert = x509_cert::Certificate::from_der(cert).ok()?;
    for rdn in cert.tbs_certificate.subject.0.iter() {
        for attribute in rdn.0.iter() {
            if attribute.oid != const_oid::db::rfc4519::CN {
                continue;
            }
            // The content octets of a UTF8String or PrintableString are the
            // string bytes themselves.
            return std::str::from_utf8(attribute.value.value())
                .ok()
                .map(ToString::to_string);
        }
    }
    None
}

/// Build the application router.
#[must_use]
pub fn router(state: Arc<RuntimeState>) -> Router {
    Router::new()
        .route(
            "/certgen/{username}",
            get(handlers::certgen::certgen_get).post(handlers::certgen::certgen_post),
        )
        .route(
            "/api/v0/login",
            get(handlers::login::login).post(handlers::login::login),
        )
        .route("/public/loginForm", get(handlers::public::login_form))
        .route("/public/x509ca", get(handlers::public::x509_ca))
        .route("/profile", get(handlers::profile::profile_page))
        .route("/profile/", get(handlers::profile::profile_page))
        .route(
            "/u2f/RegisterRequest",
            get(handlers::secondfactor::register_request),
        )
        .route(
            "/u2f/RegisterResponse",
            post(handlers::secondfactor::register_response),
        )
        .route("/u2f/SignRequest", get(handlers::secondfactor::sign_request))
        .route(
            "/u2f/SignResponse",
            post(handlers::secondfactor::sign_response),
        )
        .route("/admin/inject", post(handlers::admin::inject))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Terminate TLS and serve the router until the process exits.
///
/// # Errors
/// Returns an error if the TLS assets cannot be loaded or the listener fails
/// to bind.
pub async fn serve(state: Arc<RuntimeState>) -> Result<()> {
    let app = router(Arc::clone(&state));

    let server_config = tls::server_config(&state.config)?;
    let acceptor = TlsAcceptor::from(Arc::new(server_config));

    let address = &state.config.base.http_address;
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("cannot bind {address}"))?;

    info!("listening on https://{address}");

    loop {
        let (tcp_stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("cannot accept connection: {err}");
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let app = app.clone();

        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(tcp_stream).await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("TLS handshake with {remote_addr} failed: {err}");
                    return;
                }
            };

            let identity =
                ClientIdentity::from_peer_certificates(tls_stream.get_ref().1.peer_certificates());

            let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                request.extensions_mut().insert(identity.clone());
                app.clone().call(request)
            });

            if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(tls_stream), service)
                .await
            {
                warn!("cannot serve connection from {remote_addr}: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::test_support;
    use x509_cert::der::Encode;

    #[test]
    fn no_peer_certificates_means_unverified() {
        let identity = ClientIdentity::from_peer_certificates(None);
        assert!(!identity.verified);
        assert!(identity.common_name.is_none());
    }

    #[test]
    fn peer_certificate_yields_common_name() {
        let signer = test_support::ca_signer();
        let der = signer.ca_cert().to_der().unwrap();
        let certs = vec![CertificateDer::from(der)];

        let identity = ClientIdentity::from_peer_certificates(Some(&certs));
        assert!(identity.verified);
        assert_eq!(identity.common_name.as_deref(), Some(test_support::TEST_HOST));
    }
}
