//! Local password file verification. Rows are `username:hash` and only
//! bcrypt hashes are accepted.

use anyhow::{Context, Result, bail};
use secrecy::{ExposeSecret, SecretString};

/// Verify a password against the given htpasswd buffer.
///
/// # Errors
/// Returns an error when the buffer is not UTF-8, when the user's row carries
/// a non-bcrypt hash, or when hash verification itself fails.
pub fn verify(username: &str, password: &SecretString, buffer: &[u8]) -> Result<bool> {
    let content = std::str::from_utf8(buffer).context("htpasswd file is not UTF-8")?;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((user, hash)) = line.split_once(':') else {
            continue;
        };
        if user != username {
            continue;
        }

        if !hash.starts_with("$2") {
            bail!("unsupported hash for {username}: bcrypt only");
        }

        return bcrypt::verify(password.expose_secret(), hash)
            .context("bcrypt verification failed");
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COST: u32 = 4;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn accepts_matching_password() {
        let hash = bcrypt::hash("secret", COST).unwrap();
        let buffer = format!("alice:{hash}\n");

        assert!(verify("alice", &secret("secret"), buffer.as_bytes()).unwrap());
    }

    #[test]
    fn rejects_wrong_password() {
        let hash = bcrypt::hash("secret", COST).unwrap();
        let buffer = format!("alice:{hash}\n");

        assert!(!verify("alice", &secret("wrong"), buffer.as_bytes()).unwrap());
    }

    #[test]
    fn unknown_user_is_invalid() {
        let hash = bcrypt::hash("secret", COST).unwrap();
        let buffer = format!("alice:{hash}\n");

        assert!(!verify("bob", &secret("secret"), buffer.as_bytes()).unwrap());
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let hash = bcrypt::hash("secret", COST).unwrap();
        let buffer = format!("# staff\n\nalice:{hash}\n");

        assert!(verify("alice", &secret("secret"), buffer.as_bytes()).unwrap());
    }

    #[test]
    fn non_bcrypt_hash_is_an_error() {
        let buffer = b"alice:$apr1$abcdefgh$012345678901234567890\n";

        assert!(verify("alice", &secret("secret"), buffer).is_err());
    }
}
