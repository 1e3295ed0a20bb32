//! # Sigilo (Short-Lived Credential Mint)
//!
//! `sigilo` is a single-sign-on hub for command-line workflows. An
//! authenticated user obtains a freshly minted SSH user certificate and/or an
//! X.509 client certificate, each signed by a locally held CA key and bound to
//! the requester's identity, with validity measured in hours. SSH daemons and
//! TLS services that trust the CA accept the minted credentials without any
//! per-host provisioning.
//!
//! ## CA lifecycle (sealed / unsealed)
//!
//! The CA private key is either read in the clear from disk at startup or
//! delivered at runtime: when the configured key file holds a PGP-armored
//! payload the daemon boots *sealed* and refuses to issue credentials until a
//! trusted administrative client posts the decryption passphrase over a
//! client-certificate authenticated channel. Unsealing is one-way for the
//! process lifetime; a second attempt is refused.
//!
//! ## Authentication
//!
//! Primary authentication tries the configured `ldaps` directories in order
//! and falls back to a local bcrypt password file. A successful login mints a
//! short-lived (5 minute) session cookie. Users may additionally enroll
//! hardware security keys through a two-round-trip challenge/response
//! ceremony; each assertion advances a monotonic counter used for replay
//! detection.
//!
//! ## State
//!
//! All mutable state (the CA slot, the session map, and the per-user
//! second-factor profiles) lives in a single [`state::RuntimeState`] value
//! constructed at startup and guarded by one mutex. Only the profile map is
//! persisted, as an opaque blob under the configured data directory.

pub mod api;
pub mod auth;
pub mod certgen;
pub mod cli;
pub mod config;
pub mod keylookup;
pub mod profiles;
pub mod secondfactor;
pub mod signer;
pub mod state;
pub mod tls;
