//! TLS configuration for the front door.
//!
//! Builds a rustls server config from the configured certificate and key.
//! The negotiated protocol floor is TLS 1.2, key exchange favors the stronger
//! curves first, and only AEAD ECDHE suites are offered. When a client CA
//! bundle is configured, client certificates are requested and verified when
//! presented; connections without one are still accepted so the
//! administrative endpoint can reject them with an explicit status.
//!
//! Security boundary: the service refuses to start without valid TLS assets.

use crate::config::AppConfig;
use anyhow::{Context, Result, anyhow};
use rustls::{
    RootCertStore, ServerConfig,
    crypto::{CryptoProvider, ring as provider},
    pki_types::{CertificateDer, PrivateKeyDer},
    server::WebPkiClientVerifier,
};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

fn crypto_provider() -> CryptoProvider {
    let mut crypto = provider::default_provider();
    crypto.cipher_suites = vec![
        provider::cipher_suite::TLS13_AES_256_GCM_SHA384,
        provider::cipher_suite::TLS13_AES_128_GCM_SHA256,
        provider::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        provider::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
        provider::cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        provider::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        provider::cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        provider::cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        provider::cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    ];
    crypto.kx_groups = vec![
        provider::kx_group::SECP384R1,
        provider::kx_group::SECP256R1,
        provider::kx_group::X25519,
    ];
    crypto
}

/// Build the TLS server configuration for the front door.
///
/// # Errors
/// Returns an error if certificate, key, or client CA bundle cannot be read
/// or parsed.
pub fn server_config(config: &AppConfig) -> Result<ServerConfig> {
    let cert_chain = load_cert_chain(&config.base.tls_cert_filename)?;
    let key = load_private_key(&config.base.tls_key_filename)?;

    let crypto = Arc::new(crypto_provider());
    let builder = ServerConfig::builder_with_provider(Arc::clone(&crypto))
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
        .context("cannot select TLS protocol versions")?;

    let builder = match &config.base.client_ca_filename {
        Some(client_ca) => {
            let roots = load_root_store(client_ca)?;
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), crypto)
                .allow_unauthenticated()
                .build()
                .context("cannot build client certificate verifier")?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut server_config = builder
        .with_single_cert(cert_chain, key)
        .context("cannot build TLS server config")?;

    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(server_config)
}

fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .with_context(|| format!("cannot open TLS certificate: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let certs = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("cannot read TLS certificate: {}", path.display()))?;
    if certs.is_empty() {
        return Err(anyhow!("TLS certificate is empty: {}", path.display()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file =
        File::open(path).with_context(|| format!("cannot open TLS key: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut keys = pkcs8_private_keys(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("cannot read PKCS#8 TLS key: {}", path.display()))?;
    if let Some(key) = keys.pop() {
        return Ok(PrivateKeyDer::Pkcs8(key));
    }

    let file =
        File::open(path).with_context(|| format!("cannot open TLS key: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut keys = rsa_private_keys(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("cannot read PKCS#1 TLS key: {}", path.display()))?;
    if let Some(key) = keys.pop() {
        return Ok(PrivateKeyDer::Pkcs1(key));
    }

    Err(anyhow!("TLS private key not found: {}", path.display()))
}

fn load_root_store(path: &Path) -> Result<RootCertStore> {
    let file = File::open(path)
        .with_context(|| format!("cannot open client CA bundle: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let certs = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("cannot read client CA bundle: {}", path.display()))?;
    if certs.is_empty() {
        return Err(anyhow!("client CA bundle is empty: {}", path.display()));
    }
    let mut store = RootCertStore::empty();
    let (added, _) = store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(anyhow!(
            "no valid CA certificates found in {}",
            path.display()
        ));
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BaseConfig, LdapConfig};
    use crate::signer::test_support;
    use rsa::pkcs8::EncodePrivateKey;
    use std::path::PathBuf;
    use uuid::Uuid;
    use x509_cert::der::{EncodePem, pem::LineEnding};

    fn missing_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sigilo-tls-test-{label}-{}", Uuid::new_v4()))
    }

    fn temp_file(label: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("sigilo-tls-{label}-{}", Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Server cert/key material derived from the shared test CA.
    fn tls_assets() -> (PathBuf, PathBuf) {
        use rsa::pkcs1::DecodeRsaPrivateKey;

        let signer = test_support::ca_signer();
        let cert_pem = signer.ca_cert().to_pem(LineEnding::LF).unwrap();

        let key = rsa::RsaPrivateKey::from_pkcs1_pem(test_support::ca_key_pem()).unwrap();
        let key_pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();

        (
            temp_file("cert", cert_pem.as_bytes()),
            temp_file("key", key_pem.as_bytes()),
        )
    }

    fn config_with(cert: PathBuf, key: PathBuf, client_ca: Option<PathBuf>) -> AppConfig {
        AppConfig {
            base: BaseConfig {
                tls_cert_filename: cert,
                tls_key_filename: key,
                client_ca_filename: client_ca,
                ..BaseConfig::default()
            },
            ldap: LdapConfig::default(),
        }
    }

    #[test]
    fn load_private_key_missing_fails() {
        let path = missing_path("key");
        assert!(load_private_key(&path).is_err());
    }

    #[test]
    fn load_root_store_missing_fails() {
        let path = missing_path("ca");
        assert!(load_root_store(&path).is_err());
    }

    #[test]
    fn server_config_without_client_ca() {
        let (cert, key) = tls_assets();
        let config = config_with(cert.clone(), key.clone(), None);

        let server_config = server_config(&config).unwrap();
        assert_eq!(server_config.alpn_protocols, vec![b"http/1.1".to_vec()]);

        for p in [cert, key] {
            let _ = std::fs::remove_file(p);
        }
    }

    #[test]
    fn server_config_with_client_ca() {
        let (cert, key) = tls_assets();
        let signer = test_support::ca_signer();
        let ca_pem = signer.ca_cert().to_pem(LineEnding::LF).unwrap();
        let client_ca = temp_file("client-ca", ca_pem.as_bytes());

        let config = config_with(cert.clone(), key.clone(), Some(client_ca.clone()));
        assert!(server_config(&config).is_ok());

        for p in [cert, key, client_ca] {
            let _ = std::fs::remove_file(p);
        }
    }

    #[test]
    fn server_config_rejects_garbage_assets() {
        let cert = temp_file("bad-cert", b"not a pem");
        let key = temp_file("bad-key", b"not a pem");

        let config = config_with(cert.clone(), key.clone(), None);
        assert!(server_config(&config).is_err());

        for p in [cert, key] {
            let _ = std::fs::remove_file(p);
        }
    }
}
