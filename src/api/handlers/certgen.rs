//! Certificate issuance endpoints.
//!
//! `GET /certgen/<username>` signs the caller's published SSH key (fetched
//! through the local key lookup helper); `POST` signs a submitted public key,
//! either SSH (`type=ssh`, the default) or X.509 (`type=x509`). The path
//! suffix must match the authenticated identity byte for byte.

use super::{check_auth, failure_response, require_signer};
use crate::{
    certgen,
    keylookup::{self, KeyLookup},
    state::RuntimeState,
};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, error, info, warn};

const SSH_CERT_FILENAME: &str = "id_rsa-cert.pub";
const X509_CERT_FILENAME: &str = "userCert.pem";

/// Shape of an OpenSSH public key line a caller may submit.
static SSH_PUBKEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(ssh-rsa|ssh-dss|ecdsa-sha2-nistp256|ssh-ed25519) [a-zA-Z0-9/+]+=?=? ?.{0,512}\n?$")
        .expect("static regex")
});

enum CertKind {
    Ssh,
    X509,
}

fn cert_kind(
    headers: &HeaderMap,
    requested: Option<&str>,
) -> Result<CertKind, Response> {
    match requested.unwrap_or("ssh") {
        "ssh" => Ok(CertKind::Ssh),
        "x509" => Ok(CertKind::X509),
        other => {
            info!("unrecognized cert type {other}");
            Err(failure_response(
                headers,
                StatusCode::BAD_REQUEST,
                "Unrecognized cert type",
            ))
        }
    }
}

/// Common gate for both methods: unsealed signer, authenticated caller,
/// caller identity equals the path target.
async fn certgen_gate(
    state: &RuntimeState,
    headers: &HeaderMap,
    target_user: &str,
) -> Result<Arc<crate::signer::CaSigner>, Response> {
    let signer = require_signer(state, headers)?;

    let auth_user = check_auth(state, headers).await?;
    if auth_user != target_user {
        warn!("user {auth_user} asking for creds for {target_user}");
        return Err(failure_response(headers, StatusCode::FORBIDDEN, ""));
    }
    debug!("auth succeeded for {auth_user}");

    Ok(signer)
}

fn attachment(filename: &str, body: String) -> Response {
    (
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )],
        body,
    )
        .into_response()
}

/// `GET`: fetch the target user's published key and sign it.
pub async fn certgen_get(
    State(state): State<Arc<RuntimeState>>,
    Path(username): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let signer = match certgen_gate(&state, &headers, &username).await {
        Ok(signer) => signer,
        Err(response) => return response,
    };

    match cert_kind(&headers, params.get("type").map(String::as_str)) {
        Ok(CertKind::Ssh) => {}
        // Submitting the public key body is unavoidable for X.509.
        Ok(CertKind::X509) => {
            return failure_response(&headers, StatusCode::METHOD_NOT_ALLOWED, "");
        }
        Err(response) => return response,
    }

    let key = match keylookup::user_public_key(&username).await {
        Ok(KeyLookup::Found(key)) => key,
        Ok(KeyLookup::NoKey) => {
            info!("no published key for {username}");
            return failure_response(&headers, StatusCode::NOT_FOUND, "");
        }
        Err(err) => {
            error!("key lookup failed: {err:#}");
            return failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "");
        }
    };

    let public_key = match ssh_key::PublicKey::from_openssh(key.trim()) {
        Ok(key) => key,
        Err(err) => {
            error!("published key for {username} does not parse: {err}");
            return failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "");
        }
    };

    sign_ssh_response(&state, &headers, &signer, &username, &public_key)
}

/// `POST`: sign the submitted `pubkeyfile`.
pub async fn certgen_post(
    State(state): State<Arc<RuntimeState>>,
    Path(username): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let signer = match certgen_gate(&state, &headers, &username).await {
        Ok(signer) => signer,
        Err(response) => return response,
    };

    let mut requested_type: Option<String> = None;
    let mut pubkeyfile: Option<Vec<u8>> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().unwrap_or_default().to_string();
                let Ok(data) = field.bytes().await else {
                    return failure_response(
                        &headers,
                        StatusCode::BAD_REQUEST,
                        "Error parsing form",
                    );
                };
                match name.as_str() {
                    "type" => requested_type = Some(String::from_utf8_lossy(&data).into_owned()),
                    "pubkeyfile" => pubkeyfile = Some(data.to_vec()),
                    _ => {}
                }
            }
            Ok(None) => break,
            Err(err) => {
                info!("cannot parse multipart form: {err}");
                return failure_response(&headers, StatusCode::BAD_REQUEST, "Error parsing form");
            }
        }
    }

    let kind = match cert_kind(&headers, requested_type.as_deref()) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    let Some(pubkeyfile) = pubkeyfile else {
        return failure_response(
            &headers,
            StatusCode::BAD_REQUEST,
            "Missing public key file",
        );
    };

    match kind {
        CertKind::Ssh => {
            let submitted = String::from_utf8_lossy(&pubkeyfile);
            if !SSH_PUBKEY_RE.is_match(&submitted) {
                info!("submitted key failed validation");
                return failure_response(&headers, StatusCode::BAD_REQUEST, "Invalid public key");
            }

            let public_key = match ssh_key::PublicKey::from_openssh(submitted.trim()) {
                Ok(key) => key,
                Err(err) => {
                    info!("submitted key does not parse: {err}");
                    return failure_response(
                        &headers,
                        StatusCode::BAD_REQUEST,
                        "Invalid public key",
                    );
                }
            };

            sign_ssh_response(&state, &headers, &signer, &username, &public_key)
        }
        CertKind::X509 => {
            let spki = match certgen::x509::parse_public_key_pem(&pubkeyfile) {
                Ok(spki) => spki,
                Err(err) => {
                    info!("submitted public key PEM does not parse: {err:#}");
                    return failure_response(
                        &headers,
                        StatusCode::BAD_REQUEST,
                        "Unable to decode pem",
                    );
                }
            };

            let pem = match certgen::x509::issue_user_cert(
                signer.x509_key(),
                signer.ca_cert(),
                &username,
                spki,
                state.realm(),
            ) {
                Ok(pem) => pem,
                Err(err) => {
                    error!("cannot generate x509 cert: {err:#}");
                    return failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "");
                }
            };

            info!("generated x509 certificate for {username}");
            attachment(X509_CERT_FILENAME, pem)
        }
    }
}

fn sign_ssh_response(
    state: &RuntimeState,
    headers: &HeaderMap,
    signer: &crate::signer::CaSigner,
    username: &str,
    public_key: &ssh_key::PublicKey,
) -> Response {
    match certgen::ssh::sign_user_cert(
        signer.ssh_key(),
        username,
        public_key,
        &state.host_identity,
    ) {
        Ok(cert) => {
            info!("generated SSH certificate for {username}");
            attachment(SSH_CERT_FILENAME, cert)
        }
        Err(err) => {
            error!("cannot sign user key: {err:#}");
            failure_response(headers, StatusCode::INTERNAL_SERVER_ERROR, "")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submitted_key_shapes() {
        let valid = [
            "ssh-rsa AAAAB3NzaC1yc2E= alice@host\n",
            "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 alice@host",
            "ecdsa-sha2-nistp256 AAAAE2VjZHNh==\n",
            "ssh-dss AAAAB3Nza/+abc=",
        ];
        for key in valid {
            assert!(SSH_PUBKEY_RE.is_match(key), "expected match: {key:?}");
        }

        let invalid = [
            "ssh-rsa\n",
            "rsa AAAA alice@host",
            "ssh-rsa !notbase64 alice",
            "ssh-rsa AAAA extra\nssh-rsa AAAA injected",
        ];
        for key in invalid {
            assert!(!SSH_PUBKEY_RE.is_match(key), "expected no match: {key:?}");
        }
    }

    #[test]
    fn comment_length_is_bounded() {
        let long_comment = "x".repeat(513);
        let key = format!("ssh-rsa AAAAB3NzaC1yc2E= {long_comment}");
        assert!(!SSH_PUBKEY_RE.is_match(&key));
    }
}
