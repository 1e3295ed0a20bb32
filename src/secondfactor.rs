//! Hardware security key ceremonies.
//!
//! The ceremonies bind to a fixed application identity derived from the host
//! identity. Attestation is deliberately not enforced: second factors are
//! self-asserted and enrollment is gated by primary authentication alone.

use crate::profiles::UserProfile;
use anyhow::{Context, Result};
use url::Url;
use uuid::Uuid;
use webauthn_rs::{
    Webauthn, WebauthnBuilder,
    prelude::{
        AuthenticationResult, CreationChallengeResponse, PublicKeyCredential,
        RegisterPublicKeyCredential, RequestChallengeResponse, SecurityKey,
        SecurityKeyAuthentication, SecurityKeyRegistration, WebauthnError,
    },
};

/// The application identity is pinned to this port regardless of the bind
/// address; clients are configured against the documented identity.
pub const APP_ID_PORT: u16 = 33443;

pub struct SecondFactor {
    webauthn: Webauthn,
    app_id: String,
}

impl SecondFactor {
    /// Build the ceremony engine for the given host identity. The identity
    /// string doubles as the single trusted facet.
    ///
    /// # Errors
    /// Returns an error if the derived application identity is not a valid
    /// origin.
    pub fn new(host_identity: &str) -> Result<Self> {
        let app_id = format!("https://{host_identity}:{APP_ID_PORT}");
        let origin = Url::parse(&app_id).context("cannot parse application identity")?;

        let webauthn = WebauthnBuilder::new(host_identity, &origin)
            .context("cannot configure ceremony engine")?
            .rp_name(host_identity)
            .build()
            .context("cannot build ceremony engine")?;

        Ok(Self { webauthn, app_id })
    }

    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Stable per-user handle; usernames are the only identity the daemon
    /// knows.
    #[must_use]
    pub fn user_handle(username: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, username.as_bytes())
    }

    /// Start enrollment. Already-registered keys are excluded so the
    /// authenticator refuses duplicates.
    ///
    /// # Errors
    /// Returns an error if challenge generation fails.
    pub fn begin_registration(
        &self,
        username: &str,
        profile: &UserProfile,
    ) -> Result<(CreationChallengeResponse, SecurityKeyRegistration), WebauthnError> {
        self.webauthn.start_securitykey_registration(
            Self::user_handle(username),
            username,
            username,
            Some(profile.credential_ids()),
            None,
            None,
        )
    }

    /// Verify an enrollment response against the pending challenge.
    ///
    /// # Errors
    /// Returns an error if the response does not match the challenge.
    pub fn finish_registration(
        &self,
        response: &RegisterPublicKeyCredential,
        challenge: &SecurityKeyRegistration,
    ) -> Result<SecurityKey, WebauthnError> {
        self.webauthn
            .finish_securitykey_registration(response, challenge)
    }

    /// Start an authentication ceremony over the user's enrolled keys.
    ///
    /// # Errors
    /// Returns an error if no key can be used or challenge generation fails.
    pub fn begin_authentication(
        &self,
        profile: &UserProfile,
    ) -> Result<(RequestChallengeResponse, SecurityKeyAuthentication), WebauthnError> {
        self.webauthn
            .start_securitykey_authentication(&profile.security_keys())
    }

    /// Verify an assertion against the pending challenge. The result carries
    /// the authenticator-reported counter used as the replay monotonic.
    ///
    /// # Errors
    /// Returns an error if no enrolled key verifies the assertion, including
    /// the replayed-counter case.
    pub fn finish_authentication(
        &self,
        response: &PublicKeyCredential,
        challenge: &SecurityKeyAuthentication,
    ) -> Result<AuthenticationResult, WebauthnError> {
        self.webauthn
            .finish_securitykey_authentication(response, challenge)
    }
}
