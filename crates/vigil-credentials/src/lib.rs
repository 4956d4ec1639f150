//! Credential discovery for gateway recovery.
//!
//! Finds the first working messaging credential and the first working
//! model-provider credential for an isolation group, in a deterministic order,
//! recording every attempt in the diagnostics ledger. Also hosts the pure
//! credential classification and auth-header mapping used by validators.

mod auth;
mod discovery;
mod oauth_profiles;
mod validators;

pub use auth::*;
pub use discovery::*;
pub use oauth_profiles::*;
pub use validators::*;
