//! Directory binds over `ldaps`.

use anyhow::{Context, Result, bail};
use ldap3::{LdapConnAsync, LdapConnSettings};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Bound on each connection attempt; a slow directory must not stall logins.
pub const BIND_TIMEOUT: Duration = Duration::from_secs(3);

const DEFAULT_LDAPS_PORT: u16 = 636;

/// Produce a bind DN from the configured pattern. The pattern carries a
/// single `%s` slot.
#[must_use]
pub fn bind_dn(username: &str, bind_pattern: &str) -> String {
    bind_pattern.replacen("%s", username, 1)
}

/// Parse and validate a directory URL. Only the secure scheme is accepted.
///
/// # Errors
/// Returns an error for unparsable URLs, non-`ldaps` schemes, or URLs without
/// a host.
pub fn parse_directory_url(raw: &str) -> Result<(String, u16)> {
    let url = Url::parse(raw).with_context(|| format!("cannot parse directory URL: {raw}"))?;

    if url.scheme() != "ldaps" {
        bail!("invalid directory scheme (only ldaps is supported): {raw}");
    }

    let host = url
        .host_str()
        .with_context(|| format!("directory URL has no host: {raw}"))?
        .to_string();
    let port = url.port().unwrap_or(DEFAULT_LDAPS_PORT);

    Ok((host, port))
}

/// Attempt a simple bind against one directory.
///
/// Returns the directory's verdict when the exchange completes: `true` on an
/// accepted bind, `false` on a rejected one.
///
/// # Errors
/// Returns an error on URL or transport failures; callers move on to the next
/// configured directory.
pub async fn check_bind(raw_url: &str, bind_dn: &str, password: &SecretString) -> Result<bool> {
    let (host, port) = parse_directory_url(raw_url)?;

    debug!("about to connect to {host}:{port}");

    let settings = LdapConnSettings::new().set_conn_timeout(BIND_TIMEOUT);
    let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &format!("ldaps://{host}:{port}"))
        .await
        .with_context(|| format!("cannot connect to directory {host}:{port}"))?;
    ldap3::drive!(conn);

    let result = ldap
        .simple_bind(bind_dn, password.expose_secret())
        .await
        .with_context(|| format!("bind exchange with {host}:{port} failed"))?;
    let _ = ldap.unbind().await;

    if result.rc != 0 {
        debug!("bind rejected by {host}:{port} (rc={})", result.rc);
    }

    Ok(result.rc == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_dn_substitutes_username() {
        assert_eq!(
            bind_dn("alice", "uid=%s,ou=people,dc=example,dc=com"),
            "uid=alice,ou=people,dc=example,dc=com"
        );
    }

    #[test]
    fn bind_dn_substitutes_once() {
        assert_eq!(bind_dn("alice", "uid=%s,cn=%s"), "uid=alice,cn=%s");
    }

    #[test]
    fn parse_directory_url_defaults_port() {
        let (host, port) = parse_directory_url("ldaps://ldap.example.com").unwrap();
        assert_eq!(host, "ldap.example.com");
        assert_eq!(port, 636);
    }

    #[test]
    fn parse_directory_url_honors_explicit_port() {
        let (host, port) = parse_directory_url("ldaps://ldap.example.com:3269").unwrap();
        assert_eq!(host, "ldap.example.com");
        assert_eq!(port, 3269);
    }

    #[test]
    fn parse_directory_url_rejects_insecure_scheme() {
        assert!(parse_directory_url("ldap://ldap.example.com").is_err());
        assert!(parse_directory_url("https://ldap.example.com").is_err());
    }

    #[test]
    fn parse_directory_url_rejects_garbage() {
        assert!(parse_directory_url("not a url").is_err());
    }
}
