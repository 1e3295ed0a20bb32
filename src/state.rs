//! Process-wide runtime state.
//!
//! One value constructed at startup and handed to every handler. A single
//! mutex guards the CA slot, the session cookie map and the user profile
//! map; critical sections stay narrow (handlers copy the signer handle out
//! and sign outside the lock). The one exception is the profile write path,
//! which holds the lock across the read-modify-write and the blob
//! serialization to avoid torn state on disk.

use crate::{
    config::{AppConfig, exists_and_can_read},
    profiles::{self, ProfileMap, UserProfile},
    secondfactor::SecondFactor,
    signer::{CaSigner, CaState, unseal},
};
use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE};
use rand::RngCore;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

pub const AUTH_COOKIE_NAME: &str = "auth_cookie";
pub const COOKIE_MAX_AGE: Duration = Duration::from_secs(300);

const COOKIE_ENTROPY_BYTES: usize = 32;
const EXPIRER_PERIOD: Duration = Duration::from_secs(30);

/// An authenticated session. An entry whose expiry has passed is treated as
/// absent.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub username: String,
    pub expires_at: SystemTime,
}

struct StateInner {
    ca: CaState,
    sessions: HashMap<String, AuthInfo>,
    profiles: ProfileMap,
}

pub struct RuntimeState {
    pub config: AppConfig,
    pub host_identity: String,
    pub second_factor: SecondFactor,
    inner: Mutex<StateInner>,
}

/// Outcome of an unseal attempt against the runtime state.
#[derive(Debug, PartialEq, Eq)]
pub enum UnsealOutcome {
    Installed,
    AlreadyUnsealed,
}

impl RuntimeState {
    /// Build the runtime state: resolve the host identity, classify the CA
    /// key material, configure the ceremony engine, and restore persisted
    /// profiles.
    ///
    /// # Errors
    /// Returns an error on any configuration problem; a missing or unreadable
    /// profile blob is logged instead.
    pub fn new(config: AppConfig) -> Result<Self> {
        let host_identity = config.host_identity()?;
        let second_factor = SecondFactor::new(&host_identity)?;

        let ca_raw = exists_and_can_read(&config.base.ssh_ca_filename, "ssh CA")?;
        let ca = CaState::from_raw(
            ca_raw,
            &host_identity,
            config.base.kerberos_realm.as_deref(),
            config.base.client_ca_filename.is_some(),
        )
        .context("cannot load CA key material")?;

        if ca.is_sealed() {
            info!("CA key is sealed; waiting for administrative unseal");
        }

        let profiles = match profiles::load(&config.base.data_directory) {
            Ok(profiles) => {
                info!("restored {} user profile(s)", profiles.len());
                profiles
            }
            Err(err) => {
                warn!("cannot load user profiles: {err:#}");
                ProfileMap::new()
            }
        };

        Ok(Self {
            config,
            host_identity,
            second_factor,
            inner: Mutex::new(StateInner {
                ca,
                sessions: HashMap::new(),
                profiles,
            }),
        })
    }

    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.config.base.kerberos_realm.as_deref()
    }

    /// Copy the signer handle out of the state, if unsealed.
    #[must_use]
    pub fn signer(&self) -> Option<Arc<CaSigner>> {
        self.lock().ca.signer()
    }

    /// One-shot unseal. Holds the lock across decryption so two concurrent
    /// attempts cannot both install a signer.
    ///
    /// # Errors
    /// Returns an error when decryption or key installation fails; the state
    /// remains sealed and a later attempt may still succeed.
    pub fn unseal(&self, passphrase: &SecretString) -> Result<UnsealOutcome> {
        let mut inner = self.lock();

        let armored = match &inner.ca {
            CaState::Unsealed(_) => return Ok(UnsealOutcome::AlreadyUnsealed),
            CaState::Sealed { armored } => armored.clone(),
        };

        let signer = unseal(
            &armored,
            passphrase,
            &self.host_identity,
            self.config.base.kerberos_realm.as_deref(),
        )?;

        inner.ca = CaState::Unsealed(Arc::new(signer));

        Ok(UnsealOutcome::Installed)
    }

    /// Record a fresh session and return the cookie value.
    ///
    /// # Errors
    /// Returns an error when the entropy source fails.
    pub fn issue_session(&self, username: &str) -> Result<String> {
        let mut raw = [0u8; COOKIE_ENTROPY_BYTES];
        rand::rngs::OsRng
            .try_fill_bytes(&mut raw)
            .context("cannot draw cookie entropy")?;
        let cookie = URL_SAFE.encode(raw);

        let info = AuthInfo {
            username: username.to_string(),
            expires_at: SystemTime::now() + COOKIE_MAX_AGE,
        };

        self.lock().sessions.insert(cookie.clone(), info);

        Ok(cookie)
    }

    /// Resolve a cookie value to the authenticated username. Expired entries
    /// are treated as absent.
    #[must_use]
    pub fn session_username(&self, cookie: &str) -> Option<String> {
        let inner = self.lock();
        let info = inner.sessions.get(cookie)?;
        if info.expires_at <= SystemTime::now() {
            return None;
        }
        Some(info.username.clone())
    }

    /// Drop expired sessions; returns (before, after) sizes.
    pub fn expire_sessions(&self) -> (usize, usize) {
        let now = SystemTime::now();
        let mut inner = self.lock();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, info| info.expires_at > now);
        let after = inner.sessions.len();
        (before, after)
    }

    /// Run the cookie expirer until the process exits.
    pub fn spawn_session_expirer(state: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                let (before, after) = state.expire_sessions();
                debug!("auth cookie sizes: before:({before}) after ({after})");
                tokio::time::sleep(EXPIRER_PERIOD).await;
            }
        });
    }

    /// Mutate a user's profile under the lock without persisting.
    pub fn with_profile<R>(&self, username: &str, f: impl FnOnce(&mut UserProfile) -> R) -> R {
        let mut inner = self.lock();
        let profile = inner.profiles.entry(username.to_string()).or_default();
        f(profile)
    }

    /// Mutate a user's profile and, when the closure succeeds, persist the
    /// whole map while still holding the lock.
    ///
    /// # Errors
    /// Propagates the closure's error, or the blob write failure.
    pub fn with_profile_persist<R>(
        &self,
        username: &str,
        f: impl FnOnce(&mut UserProfile) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.lock();
        let profile = inner.profiles.entry(username.to_string()).or_default();
        let result = f(profile)?;

        profiles::save(&inner.profiles, &self.config.base.data_directory)
            .context("cannot persist user profiles")?;

        Ok(result)
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        // A poisoned lock means a handler panicked mid-update; the maps are
        // still structurally sound.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::{BaseConfig, LdapConfig};
    use crate::signer::test_support::{TEST_HOST, ca_signer};
    use std::path::PathBuf;
    use uuid::Uuid;

    /// Runtime state with an unsealed test CA and a throwaway data
    /// directory.
    pub(crate) fn unsealed_state() -> Arc<RuntimeState> {
        state_with_ca(CaState::Unsealed(ca_signer()))
    }

    /// Runtime state that boots sealed, retaining the given armored payload.
    pub(crate) fn sealed_state(armored: Vec<u8>) -> Arc<RuntimeState> {
        state_with_ca(CaState::Sealed { armored })
    }

    /// Unsealed state whose primary authenticator knows one user through a
    /// throwaway password file.
    pub(crate) fn unsealed_state_with_htpasswd(
        username: &str,
        password: &str,
    ) -> Arc<RuntimeState> {
        let state = unsealed_state();

        let hash = bcrypt::hash(password, 4).unwrap();
        let htpasswd = state
            .config
            .base
            .data_directory
            .join("htpasswd");
        std::fs::write(&htpasswd, format!("{username}:{hash}\n")).unwrap();

        // The config is immutable after construction everywhere else; tests
        // reach in before handing the state out.
        let mut state = Arc::into_inner(state).unwrap();
        state.config.base.htpasswd_filename = Some(htpasswd);
        Arc::new(state)
    }

    fn state_with_ca(ca: CaState) -> Arc<RuntimeState> {
        let data_directory = temp_data_dir();
        let config = AppConfig {
            base: BaseConfig {
                http_address: "127.0.0.1:33443".to_string(),
                host_identity: Some(TEST_HOST.to_string()),
                kerberos_realm: Some(crate::signer::test_support::TEST_REALM.to_string()),
                data_directory,
                ..BaseConfig::default()
            },
            ldap: LdapConfig::default(),
        };

        Arc::new(RuntimeState {
            host_identity: TEST_HOST.to_string(),
            second_factor: SecondFactor::new(TEST_HOST).unwrap(),
            inner: Mutex::new(StateInner {
                ca,
                sessions: HashMap::new(),
                profiles: ProfileMap::new(),
            }),
            config,
        })
    }

    fn temp_data_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sigilo-state-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_cookie_is_unauthenticated() {
        let state = test_support::unsealed_state();
        assert!(state.session_username("no-such-cookie").is_none());
    }

    #[test]
    fn issued_cookie_resolves_to_username() {
        let state = test_support::unsealed_state();
        let cookie = state.issue_session("alice").unwrap();

        assert!(cookie.len() >= 43);
        assert_eq!(state.session_username(&cookie).as_deref(), Some("alice"));
    }

    #[test]
    fn cookies_are_unique() {
        let state = test_support::unsealed_state();
        let first = state.issue_session("alice").unwrap();
        let second = state.issue_session("alice").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn expired_session_is_absent() {
        let state = test_support::unsealed_state();
        let cookie = state.issue_session("alice").unwrap();

        // Backdate the entry past its expiry.
        {
            let mut inner = state.inner.lock().unwrap();
            let info = inner.sessions.get_mut(&cookie).unwrap();
            info.expires_at = SystemTime::now() - Duration::from_secs(1);
        }

        assert!(state.session_username(&cookie).is_none());

        let (before, after) = state.expire_sessions();
        assert_eq!(before, 1);
        assert_eq!(after, 0);
    }

    #[test]
    fn expirer_keeps_live_sessions() {
        let state = test_support::unsealed_state();
        let cookie = state.issue_session("alice").unwrap();

        let (before, after) = state.expire_sessions();
        assert_eq!(before, 1);
        assert_eq!(after, 1);
        assert!(state.session_username(&cookie).is_some());
    }

    #[test]
    fn signer_present_only_when_unsealed() {
        let sealed = test_support::sealed_state(b"-----BEGIN PGP MESSAGE-----\n".to_vec());
        assert!(sealed.signer().is_none());

        let unsealed = test_support::unsealed_state();
        assert!(unsealed.signer().is_some());
    }

    #[test]
    fn unseal_is_one_shot() {
        let state = test_support::unsealed_state();
        let outcome = state
            .unseal(&SecretString::from("anything".to_string()))
            .unwrap();
        assert_eq!(outcome, UnsealOutcome::AlreadyUnsealed);
    }

    #[test]
    fn profile_mutation_persists_on_success() {
        let state = test_support::unsealed_state();

        state
            .with_profile_persist("alice", |profile| {
                profile.registration_challenge = None;
                Ok(())
            })
            .unwrap();

        let restored = profiles::load(&state.config.base.data_directory).unwrap();
        assert!(restored.contains_key("alice"));
    }

    #[test]
    fn profile_mutation_without_persist_stays_in_memory() {
        let state = test_support::unsealed_state();

        state.with_profile("alice", |profile| {
            profile.auth_challenge = None;
        });

        assert!(profiles::load(&state.config.base.data_directory).is_err());
    }
}
