//! Authentication adapters implementing `SessionValidator`.
//!
//! - `jwks` - validates OIDC bearer tokens against the provider's published keys
//! - `mock` - fixed token table for tests and local runs

mod jwks;
mod mock;

pub use jwks::{JwksSessionValidator, JwksValidatorConfig};
pub use mock::MockSessionValidator;
