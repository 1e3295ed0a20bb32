//! Primary authentication.
//!
//! Verifies a username/password pair against the configured backends: the
//! `ldaps` directories are tried in order, and a local bcrypt password file
//! acts as the fallback. A transport-level failure against one directory is
//! logged and the next one is tried; a completed bind exchange (accepted or
//! rejected) is definitive. When no backend yields a definitive answer the
//! credentials are treated as invalid.

pub mod htpasswd;
pub mod ldap;

use crate::config::AppConfig;
use anyhow::{Context, Result};
use secrecy::SecretString;
use tracing::{debug, warn};

/// Verify a username/password pair.
///
/// Bounded by (number of directory URLs × connect timeout) plus the password
/// file read.
///
/// # Errors
/// Returns an error only when the configured password file cannot be read or
/// holds an unusable row for the user; directory failures are swallowed.
pub async fn verify_password(
    config: &AppConfig,
    username: &str,
    password: &SecretString,
) -> Result<bool> {
    let bind_dn = ldap::bind_dn(username, &config.ldap.bind_pattern);

    for url in config.ldap.ldap_target_urls.split(',') {
        if url.is_empty() {
            continue;
        }

        match ldap::check_bind(url, &bind_dn, password).await {
            // The exchange completed; the directory's verdict is final even
            // when the user is invalid.
            Ok(valid) => return Ok(valid),
            Err(err) => {
                warn!("directory bind attempt against {url} failed: {err}");
                continue;
            }
        }
    }

    if let Some(path) = &config.base.htpasswd_filename {
        debug!("falling back to password file");
        let buffer = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read htpasswd file: {}", path.display()))?;
        return htpasswd::verify(username, password, &buffer);
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, BaseConfig, LdapConfig};
    use std::fs;
    use uuid::Uuid;

    #[test]
    fn no_backends_means_invalid() {
        let config = AppConfig::default();
        let valid = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(verify_password(
                &config,
                "alice",
                &SecretString::from("secret".to_string()),
            ))
            .unwrap();
        assert!(!valid);
    }

    #[test]
    fn htpasswd_fallback_is_used() {
        let hash = bcrypt::hash("secret", bcrypt::DEFAULT_COST.min(4)).unwrap();
        let path = std::env::temp_dir().join(format!("sigilo-htpasswd-{}", Uuid::new_v4()));
        fs::write(&path, format!("alice:{hash}\n")).unwrap();

        let config = AppConfig {
            base: BaseConfig {
                htpasswd_filename: Some(path.clone()),
                ..BaseConfig::default()
            },
            ldap: LdapConfig::default(),
        };

        let rt = tokio::runtime::Runtime::new().unwrap();
        let valid = rt
            .block_on(verify_password(
                &config,
                "alice",
                &SecretString::from("secret".to_string()),
            ))
            .unwrap();
        assert!(valid);

        let invalid = rt
            .block_on(verify_password(
                &config,
                "alice",
                &SecretString::from("wrong".to_string()),
            ))
            .unwrap();
        assert!(!invalid);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_htpasswd_file_is_an_error() {
        let config = AppConfig {
            base: BaseConfig {
                htpasswd_filename: Some(
                    std::env::temp_dir().join(format!("sigilo-gone-{}", Uuid::new_v4())),
                ),
                ..BaseConfig::default()
            },
            ldap: LdapConfig::default(),
        };

        let result = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(verify_password(
                &config,
                "alice",
                &SecretString::from("secret".to_string()),
            ));
        assert!(result.is_err());
    }
}
