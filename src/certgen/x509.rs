//! X.509 issuance: the self-signed CA certificate and user client
//! certificates minted from a caller-supplied public key.

use anyhow::{Context, Result};
use const_oid::db::rfc5280::ID_KP_CLIENT_AUTH;
use rsa::pkcs8::EncodePublicKey;
use rsa::signature::Keypair;
use std::time::Duration;
use x509_cert::{
    Certificate,
    builder::{Builder, CertificateBuilder, Profile},
    der::{DecodePem, EncodePem, pem::LineEnding},
    ext::pkix::ExtendedKeyUsage,
    name::Name,
    serial_number::SerialNumber,
    spki::SubjectPublicKeyInfoOwned,
    time::Validity,
};

use super::USER_CERT_VALIDITY_SECS;

/// The CA certificate outlives the credentials it signs by a wide margin.
const CA_VALIDITY_SECS: u64 = 10 * 365 * 24 * 60 * 60;

type SigningKey = rsa::pkcs1v15::SigningKey<sha2::Sha256>;

/// Generate the self-signed CA certificate for the given identity.
///
/// # Errors
/// Returns an error if the subject cannot be parsed or the certificate cannot
/// be built or signed.
pub fn self_signed_ca(
    signing_key: &SigningKey,
    host_identity: &str,
    organization: &str,
) -> Result<Certificate> {
    let subject: Name = format!("CN={host_identity},O={organization}")
        .parse()
        .context("cannot parse CA subject")?;

    let validity = Validity::from_now(Duration::from_secs(CA_VALIDITY_SECS))
        .context("cannot compute CA validity")?;

    let spki = signer_spki(signing_key)?;

    let builder = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(rand::random::<u64>()),
        validity,
        subject,
        spki,
        signing_key,
    )
    .context("cannot create CA certificate builder")?;

    builder.build().context("cannot build CA certificate")
}

/// Mint a short-lived client certificate asserting the target username.
///
/// The subject is `CN=<username>`; the realm, when configured, shapes the
/// subject by adding the organization. Returns the PEM encoding.
///
/// # Errors
/// Returns an error if the subject cannot be parsed or the certificate cannot
/// be built or signed.
pub fn issue_user_cert(
    signing_key: &SigningKey,
    ca_cert: &Certificate,
    username: &str,
    user_spki: SubjectPublicKeyInfoOwned,
    realm: Option<&str>,
) -> Result<String> {
    let subject: Name = match realm {
        Some(realm) => format!("CN={username},O={realm}"),
        None => format!("CN={username}"),
    }
    .parse()
    .context("cannot parse certificate subject")?;

    let validity = Validity::from_now(Duration::from_secs(USER_CERT_VALIDITY_SECS))
        .context("cannot compute certificate validity")?;

    let mut builder = CertificateBuilder::new(
        Profile::Leaf {
            issuer: ca_cert.tbs_certificate.subject.clone(),
            enable_key_agreement: false,
            enable_key_encipherment: true,
        },
        SerialNumber::from(rand::random::<u64>()),
        validity,
        subject,
        user_spki,
        signing_key,
    )
    .context("cannot create certificate builder")?;

    builder
        .add_extension(&ExtendedKeyUsage(vec![ID_KP_CLIENT_AUTH]))
        .context("cannot add extended key usage")?;

    let certificate = builder.build().context("cannot build user certificate")?;

    certificate
        .to_pem(LineEnding::LF)
        .context("cannot encode user certificate")
}

/// Parse a caller-submitted `PUBLIC KEY` PEM block into a
/// subject-public-key-info.
///
/// # Errors
/// Returns an error when the input is not a PEM block of type `PUBLIC KEY`
/// holding a parsable SPKI.
pub fn parse_public_key_pem(data: &[u8]) -> Result<SubjectPublicKeyInfoOwned> {
    SubjectPublicKeyInfoOwned::from_pem(data).context("cannot decode public key PEM")
}

fn signer_spki(signing_key: &SigningKey) -> Result<SubjectPublicKeyInfoOwned> {
    let spki_pem = signing_key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .context("cannot encode CA public key")?;

    SubjectPublicKeyInfoOwned::from_pem(spki_pem.as_bytes())
        .context("cannot decode CA public key SPKI")
}
