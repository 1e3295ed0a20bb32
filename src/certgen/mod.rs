//! Certificate issuance primitives.
//!
//! Everything here is stateless: the handlers copy the signer handle out of
//! the runtime state and call into these functions outside the lock.

pub mod ssh;
pub mod x509;

/// Issued user credentials are short-lived by design.
pub const USER_CERT_VALIDITY_SECS: u64 = 24 * 60 * 60;
