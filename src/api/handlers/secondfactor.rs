//! Second-factor enrollment and authentication ceremonies.
//!
//! Each ceremony spans two requests. The challenge minted by the first
//! request is stored as the user's pending slot and consumed by the second;
//! a pending challenge is valid for a single attempt and registration and
//! authentication challenges never satisfy each other.

use super::{check_auth, failure_response, require_signer};
use crate::{
    profiles::RegisteredKey,
    state::RuntimeState,
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, info};
use webauthn_rs::prelude::{
    PublicKeyCredential, RegisterPublicKeyCredential, RequestChallengeResponse, WebauthnError,
};

/// Gate shared by all four endpoints: unsealed signer plus a logged-in user.
async fn ceremony_gate(
    state: &RuntimeState,
    headers: &HeaderMap,
) -> Result<String, Response> {
    require_signer(state, headers)?;
    check_auth(state, headers).await
}

/// Enrollment step 1: mint a registration challenge.
pub async fn register_request(
    State(state): State<Arc<RuntimeState>>,
    headers: HeaderMap,
) -> Response {
    let username = match ceremony_gate(&state, &headers).await {
        Ok(username) => username,
        Err(response) => return response,
    };

    let second_factor = &state.second_factor;
    let challenge = state.with_profile(&username, |profile| {
        let (challenge, pending) = second_factor.begin_registration(&username, profile)?;
        profile.registration_challenge = Some(pending);
        Ok::<_, WebauthnError>(challenge)
    });

    match challenge {
        Ok(challenge) => Json(challenge).into_response(),
        Err(err) => {
            error!("cannot create registration challenge: {err}");
            failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "")
        }
    }
}

/// Enrollment step 2: verify the authenticator's response and persist the
/// new registration with a zero counter.
pub async fn register_response(
    State(state): State<Arc<RuntimeState>>,
    headers: HeaderMap,
    payload: Option<Json<RegisterPublicKeyCredential>>,
) -> Response {
    let username = match ceremony_gate(&state, &headers).await {
        Ok(username) => username,
        Err(response) => return response,
    };

    let Some(Json(response)) = payload else {
        return failure_response(&headers, StatusCode::BAD_REQUEST, "invalid response");
    };

    // Single attempt: the pending challenge is consumed up front.
    let Some(challenge) = state.with_profile(&username, |profile| {
        profile.registration_challenge.take()
    }) else {
        return failure_response(&headers, StatusCode::BAD_REQUEST, "challenge not found");
    };

    let registration = match state.second_factor.finish_registration(&response, &challenge) {
        Ok(registration) => registration,
        Err(err) => {
            error!("registration verification failed: {err}");
            return failure_response(
                &headers,
                StatusCode::INTERNAL_SERVER_ERROR,
                "error verifying response",
            );
        }
    };

    let persisted = state.with_profile_persist(&username, |profile| {
        profile.registrations.push(RegisteredKey {
            counter: 0,
            registration,
        });
        Ok(())
    });

    if let Err(err) = persisted {
        error!("cannot persist registration: {err:#}");
        return failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "");
    }

    info!("registration success for {username}");
    "success".into_response()
}

enum SignRequestProblem {
    NoRegistrations,
    Ceremony(WebauthnError),
}

/// Authentication step 1: mint a sign challenge over the enrolled keys.
pub async fn sign_request(
    State(state): State<Arc<RuntimeState>>,
    headers: HeaderMap,
) -> Response {
    let username = match ceremony_gate(&state, &headers).await {
        Ok(username) => username,
        Err(response) => return response,
    };

    let second_factor = &state.second_factor;
    let challenge: Result<RequestChallengeResponse, SignRequestProblem> =
        state.with_profile(&username, |profile| {
            if profile.registrations.is_empty() {
                return Err(SignRequestProblem::NoRegistrations);
            }
            let (challenge, pending) = second_factor
                .begin_authentication(profile)
                .map_err(SignRequestProblem::Ceremony)?;
            profile.auth_challenge = Some(pending);
            Ok(challenge)
        });

    match challenge {
        Ok(challenge) => Json(challenge).into_response(),
        Err(SignRequestProblem::NoRegistrations) => {
            failure_response(&headers, StatusCode::BAD_REQUEST, "registration missing")
        }
        Err(SignRequestProblem::Ceremony(err)) => {
            error!("cannot create sign challenge: {err}");
            failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "")
        }
    }
}

/// Authentication step 2: verify the assertion. The first enrolled key that
/// verifies wins and its counter advances to the authenticator-reported
/// value.
pub async fn sign_response(
    State(state): State<Arc<RuntimeState>>,
    headers: HeaderMap,
    payload: Option<Json<PublicKeyCredential>>,
) -> Response {
    let username = match ceremony_gate(&state, &headers).await {
        Ok(username) => username,
        Err(response) => return response,
    };

    let Some(Json(response)) = payload else {
        return failure_response(&headers, StatusCode::BAD_REQUEST, "invalid response");
    };

    let Some(challenge) = state.with_profile(&username, |profile| profile.auth_challenge.take())
    else {
        return failure_response(&headers, StatusCode::BAD_REQUEST, "challenge missing");
    };

    let result = match state.second_factor.finish_authentication(&response, &challenge) {
        Ok(result) => result,
        Err(err) => {
            // Includes the replayed-counter case.
            error!("sign response verification failed: {err}");
            return failure_response(
                &headers,
                StatusCode::INTERNAL_SERVER_ERROR,
                "error verifying response",
            );
        }
    };

    let persisted = state.with_profile_persist(&username, |profile| {
        for key in &mut profile.registrations {
            if key.registration.cred_id() == result.cred_id() {
                let _ = key.registration.update_credential(&result);
                key.counter = result.counter();
            }
        }
        Ok(())
    });

    if let Err(err) = persisted {
        error!("cannot persist counter update: {err:#}");
        return failure_response(&headers, StatusCode::INTERNAL_SERVER_ERROR, "");
    }

    info!("second factor verified for {username} (counter {})", result.counter());
    "success".into_response()
}
