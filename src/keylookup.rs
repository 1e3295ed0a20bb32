//! External user-key lookup.
//!
//! The user's published SSH public key is fetched through a local helper
//! binary taking the username as its only argument and printing the key on
//! stdout. A non-zero exit means the user has no published key; a failure to
//! run the helper at all is an upstream failure the caller surfaces as an
//! internal error.

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_LOOKUP_COMMAND: &str = "/usr/bin/sss_ssh_authorizedkeys";

/// Outcome of a key lookup. `NoKey` is a normal condition; tooling failures
/// surface as `Err`.
#[derive(Debug)]
pub enum KeyLookup {
    Found(String),
    NoKey,
}

/// Fetch the user's published public key with the default helper.
///
/// # Errors
/// Returns an error when the helper cannot be executed at all.
pub async fn user_public_key(username: &str) -> Result<KeyLookup> {
    lookup_with_command(DEFAULT_LOOKUP_COMMAND, username).await
}

/// Fetch the user's published public key with an explicit helper command.
///
/// # Errors
/// Returns an error when the helper cannot be executed at all.
pub async fn lookup_with_command(command: &str, username: &str) -> Result<KeyLookup> {
    let output = Command::new(command)
        .arg(username)
        .output()
        .await
        .with_context(|| format!("cannot run key lookup helper: {command}"))?;

    if !output.status.success() {
        debug!("key lookup for {username} exited with {}", output.status);
        return Ok(KeyLookup::NoKey);
    }

    let key = String::from_utf8_lossy(&output.stdout).into_owned();
    if key.trim().is_empty() {
        return Ok(KeyLookup::NoKey);
    }

    debug!("pub key: {key}");
    Ok(KeyLookup::Found(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn helper_stdout_is_the_key() {
        let result = lookup_with_command("echo", "ssh-ed25519 AAAA alice@host")
            .await
            .unwrap();
        match result {
            KeyLookup::Found(key) => assert!(key.starts_with("ssh-ed25519 AAAA")),
            KeyLookup::NoKey => panic!("expected a key"),
        }
    }

    #[tokio::test]
    async fn non_zero_exit_means_no_key() {
        let result = lookup_with_command("false", "alice").await.unwrap();
        assert!(matches!(result, KeyLookup::NoKey));
    }

    #[tokio::test]
    async fn empty_output_means_no_key() {
        let result = lookup_with_command("true", "alice").await.unwrap();
        assert!(matches!(result, KeyLookup::NoKey));
    }

    #[tokio::test]
    async fn missing_helper_is_an_upstream_failure() {
        assert!(
            lookup_with_command("/nonexistent/sss_ssh_authorizedkeys", "alice")
                .await
                .is_err()
        );
    }
}
