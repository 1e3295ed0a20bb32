//! Per-user second-factor profiles and their on-disk persistence.
//!
//! The whole username→profile map is serialized as one opaque blob and
//! rewritten after every mutating second-factor operation. Pending ceremony
//! challenges cross two requests but deliberately never survive a restart:
//! they are excluded from serialization.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use webauthn_rs::prelude::{
    CredentialID, SecurityKey, SecurityKeyAuthentication, SecurityKeyRegistration,
};

pub const USER_PROFILE_FILENAME: &str = "userProfiles.gob";

const PROFILE_FILE_MODE: u32 = 0o640;

/// One enrolled security key and its replay-prevention counter.
#[derive(Serialize, Deserialize)]
pub struct RegisteredKey {
    pub counter: u32,
    pub registration: SecurityKey,
}

#[derive(Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub registrations: Vec<RegisteredKey>,
    #[serde(skip)]
    pub registration_challenge: Option<SecurityKeyRegistration>,
    #[serde(skip)]
    pub auth_challenge: Option<SecurityKeyAuthentication>,
}

impl UserProfile {
    /// Credential ids of the enrolled keys, for duplicate-enrollment
    /// exclusion.
    #[must_use]
    pub fn credential_ids(&self) -> Vec<CredentialID> {
        self.registrations
            .iter()
            .map(|key| key.registration.cred_id().clone())
            .collect()
    }

    /// The enrolled keys in verification order.
    #[must_use]
    pub fn security_keys(&self) -> Vec<SecurityKey> {
        self.registrations
            .iter()
            .map(|key| key.registration.clone())
            .collect()
    }
}

pub type ProfileMap = HashMap<String, UserProfile>;

/// Write the profile map blob under the data directory, mode 0640.
///
/// # Errors
/// Returns an error if serialization or the file write fails.
pub fn save(profiles: &ProfileMap, data_directory: &Path) -> Result<()> {
    let blob = serde_json::to_vec(profiles).context("cannot serialize user profiles")?;
    let path = data_directory.join(USER_PROFILE_FILENAME);

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(PROFILE_FILE_MODE)
        .open(&path)
        .with_context(|| format!("cannot open profile file: {}", path.display()))?;
    file.write_all(&blob)
        .with_context(|| format!("cannot write profile file: {}", path.display()))?;

    Ok(())
}

/// Read the profile map blob back. A missing or unreadable blob is an error
/// for the caller to log; it is not fatal at startup.
///
/// # Errors
/// Returns an error if the file cannot be read or deserialized.
pub fn load(data_directory: &Path) -> Result<ProfileMap> {
    let path = data_directory.join(USER_PROFILE_FILENAME);
    let blob = std::fs::read(&path)
        .with_context(|| format!("cannot read profile file: {}", path.display()))?;

    serde_json::from_slice(&blob).context("cannot deserialize user profiles")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sigilo-profiles-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = temp_dir();

        let mut profiles = ProfileMap::new();
        profiles.insert("alice".to_string(), UserProfile::default());
        profiles.insert("bob".to_string(), UserProfile::default());

        save(&profiles, &dir).unwrap();
        let restored = load(&dir).unwrap();

        assert_eq!(restored.len(), 2);
        assert!(restored.contains_key("alice"));
        assert!(restored.contains_key("bob"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn pending_challenges_are_not_persisted() {
        // The pending fields deserialize to None even if they were set at
        // save time; serde skips them entirely.
        let restored: UserProfile = serde_json::from_str(r#"{"registrations":[]}"#).unwrap();
        assert!(restored.registration_challenge.is_none());
        assert!(restored.auth_challenge.is_none());
    }

    #[test]
    fn load_missing_blob_is_an_error() {
        let dir = temp_dir();
        assert!(load(&dir).is_err());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn blob_mode_is_restricted() {
        let dir = temp_dir();
        save(&ProfileMap::new(), &dir).unwrap();

        let metadata = std::fs::metadata(dir.join(USER_PROFILE_FILENAME)).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o640);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn save_overwrites_previous_blob() {
        let dir = temp_dir();

        let mut profiles = ProfileMap::new();
        profiles.insert("alice".to_string(), UserProfile::default());
        save(&profiles, &dir).unwrap();

        profiles.insert("bob".to_string(), UserProfile::default());
        save(&profiles, &dir).unwrap();

        let restored = load(&dir).unwrap();
        assert_eq!(restored.len(), 2);

        let _ = std::fs::remove_dir_all(dir);
    }
}
