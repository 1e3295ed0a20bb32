//! The security-key management page.

use super::{check_auth, require_signer};
use crate::state::RuntimeState;
use axum::{
    extract::State,
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
};
use std::sync::Arc;

const PROFILE_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <title>Security Keys</title>
  </head>
  <body>
    <h1>Security Keys</h1>
    <ul>
      <li><a href="javascript:register();">Register token</a></li>
      <li><a href="javascript:sign();">Authenticate</a></li>
    </ul>
    <p>Open the browser developer tools to see debug console logs.</p>
    <script>
  function fail(step, err) {
    console.log(step, err);
    alert(step + ': ' + err);
  }
  function b64url(buf) {
    return btoa(String.fromCharCode.apply(null, new Uint8Array(buf)))
      .replace(/\+/g, '-').replace(/\//g, '_').replace(/=+$/, '');
  }
  function decodeOptions(publicKey) {
    publicKey.challenge = Uint8Array.from(atob(publicKey.challenge.replace(/-/g, '+').replace(/_/g, '/')), c => c.charCodeAt(0));
    if (publicKey.user) {
      publicKey.user.id = Uint8Array.from(atob(publicKey.user.id.replace(/-/g, '+').replace(/_/g, '/')), c => c.charCodeAt(0));
    }
    for (const list of [publicKey.excludeCredentials, publicKey.allowCredentials]) {
      if (!list) continue;
      for (const cred of list) {
        cred.id = Uint8Array.from(atob(cred.id.replace(/-/g, '+').replace(/_/g, '/')), c => c.charCodeAt(0));
      }
    }
    return publicKey;
  }
  function register() {
    fetch('/u2f/RegisterRequest').then(r => r.json()).then(req => {
      return navigator.credentials.create({ publicKey: decodeOptions(req.publicKey) });
    }).then(cred => {
      const body = {
        id: cred.id,
        rawId: b64url(cred.rawId),
        type: cred.type,
        response: {
          attestationObject: b64url(cred.response.attestationObject),
          clientDataJSON: b64url(cred.response.clientDataJSON)
        },
        extensions: {}
      };
      return fetch('/u2f/RegisterResponse', { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify(body) });
    }).then(() => alert('Success')).catch(err => fail('register', err));
  }
  function sign() {
    fetch('/u2f/SignRequest').then(r => r.json()).then(req => {
      return navigator.credentials.get({ publicKey: decodeOptions(req.publicKey) });
    }).then(cred => {
      const body = {
        id: cred.id,
        rawId: b64url(cred.rawId),
        type: cred.type,
        response: {
          authenticatorData: b64url(cred.response.authenticatorData),
          clientDataJSON: b64url(cred.response.clientDataJSON),
          signature: b64url(cred.response.signature)
        },
        extensions: {}
      };
      return fetch('/u2f/SignResponse', { method: 'POST', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify(body) });
    }).then(() => alert('Success')).catch(err => fail('sign', err));
  }
    </script>
  </body>
</html>
"#;

pub async fn profile_page(State(state): State<Arc<RuntimeState>>, headers: HeaderMap) -> Response {
    if let Err(response) = require_signer(&state, &headers) {
        return response;
    }

    if let Err(response) = check_auth(&state, &headers).await {
        return response;
    }

    Html(PROFILE_HTML).into_response()
}
