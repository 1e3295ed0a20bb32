//! OpenSSH user certificate issuance.

use anyhow::{Context, Result};
use ssh_key::{
    PublicKey,
    certificate::{Builder as CertBuilder, CertType},
    rand_core::OsRng,
};
use std::time::{SystemTime, UNIX_EPOCH};

use super::USER_CERT_VALIDITY_SECS;

/// Extensions `ssh-keygen` grants user certificates by default.
const USER_CERT_EXTENSIONS: [&str; 5] = [
    "permit-X11-forwarding",
    "permit-agent-forwarding",
    "permit-port-forwarding",
    "permit-pty",
    "permit-user-rc",
];

/// Sign a user public key into a short-lived OpenSSH user certificate.
///
/// The certificate's sole principal is the target username and the key id
/// embeds the issuing host identity (`<host-identity>_<username>`). Returns
/// the serialized certificate, newline terminated the way `ssh-keygen` writes
/// certificate files.
///
/// # Errors
/// Returns an error if the certificate cannot be built or signed.
pub fn sign_user_cert(
    ca_key: &ssh_key::PrivateKey,
    username: &str,
    public_key: &PublicKey,
    host_identity: &str,
) -> Result<String> {
    let valid_after = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before epoch")?
        .as_secs();
    let valid_before = valid_after + USER_CERT_VALIDITY_SECS;

    let mut builder = CertBuilder::new_with_random_nonce(
        &mut OsRng,
        public_key.key_data().clone(),
        valid_after,
        valid_before,
    )
    .context("cannot create certificate builder")?;

    builder.serial(0).context("cannot set serial")?;
    builder
        .key_id(format!("{host_identity}_{username}"))
        .context("cannot set key id")?;
    builder
        .cert_type(CertType::User)
        .context("cannot set certificate type")?;
    builder
        .valid_principal(username)
        .context("cannot set principal")?;
    for extension in USER_CERT_EXTENSIONS {
        builder
            .extension(extension, "")
            .context("cannot set extension")?;
    }

    let certificate = builder.sign(ca_key).context("cannot sign user key")?;

    let mut serialized = certificate
        .to_openssh()
        .context("cannot serialize certificate")?;
    serialized.push('\n');

    Ok(serialized)
}
