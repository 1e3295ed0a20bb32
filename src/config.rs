//! Application configuration.
//!
//! The daemon is configured through a single YAML document. The `base` section
//! describes the network surface and the CA material, the `ldap` section the
//! directory backends used for primary authentication. The configuration is
//! immutable after load; referenced files must exist and be readable or the
//! daemon refuses to start.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Network surface and CA material. While the contents of the issued
/// certificates are public, generation is restricted to authenticated users.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
    pub http_address: String,
    pub tls_cert_filename: PathBuf,
    pub tls_key_filename: PathBuf,
    /// Clear PEM RSA private key, or a PGP-armored payload for sealed boots.
    pub ssh_ca_filename: PathBuf,
    #[serde(default)]
    pub htpasswd_filename: Option<PathBuf>,
    /// Trust root for administrative clients. Mandatory when booting sealed.
    #[serde(default)]
    pub client_ca_filename: Option<PathBuf>,
    #[serde(default)]
    pub host_identity: Option<String>,
    #[serde(default)]
    pub kerberos_realm: Option<String>,
    pub data_directory: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LdapConfig {
    /// Format string with a single `%s` slot producing a bind DN from a
    /// username.
    #[serde(default)]
    pub bind_pattern: String,
    /// Comma-separated `ldaps://` URLs, tried in order.
    #[serde(default)]
    pub ldap_target_urls: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub base: BaseConfig,
    #[serde(default)]
    pub ldap: LdapConfig,
}

impl AppConfig {
    /// Load and verify the configuration document.
    ///
    /// # Errors
    /// Returns an error if the document is missing or malformed, or if any
    /// referenced file does not exist or cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&source)
            .with_context(|| format!("cannot parse config file: {}", path.display()))?;

        config.verify()?;

        Ok(config)
    }

    fn verify(&self) -> Result<()> {
        exists_and_can_read(&self.base.tls_cert_filename, "http cert")?;
        exists_and_can_read(&self.base.tls_key_filename, "http key")?;
        exists_and_can_read(&self.base.ssh_ca_filename, "ssh CA")?;

        if let Some(client_ca) = &self.base.client_ca_filename {
            exists_and_can_read(client_ca, "client CA")?;
        }

        if let Some(htpasswd) = &self.base.htpasswd_filename {
            exists_and_can_read(htpasswd, "htpasswd")?;
        }

        if !self.ldap.bind_pattern.is_empty() && !self.ldap.bind_pattern.contains("%s") {
            bail!("ldap bind_pattern has no %s slot");
        }

        Ok(())
    }

    /// Host identity used for the CA subject, SSH key ids and the
    /// second-factor application identity. Falls back to the resolved
    /// hostname when not configured.
    ///
    /// # Errors
    /// Returns an error if no identity is configured and the hostname cannot
    /// be resolved.
    pub fn host_identity(&self) -> Result<String> {
        if let Some(identity) = &self.base.host_identity {
            if !identity.is_empty() {
                return Ok(identity.clone());
            }
        }

        let name = hostname::get().context("cannot resolve hostname")?;
        Ok(name.to_string_lossy().into_owned())
    }
}

/// Read a configuration-referenced file, mapping failures to a description
/// the operator can act on.
///
/// # Errors
/// Returns an error if the file is missing or unreadable.
pub fn exists_and_can_read(path: &Path, description: &str) -> Result<Vec<u8>> {
    if !path.exists() {
        bail!("missing {description} file: {}", path.display());
    }
    fs::read(path).with_context(|| format!("cannot read {description} file: {}", path.display()))
}
