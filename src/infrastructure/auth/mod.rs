//! Authentication infrastructure module
//!
//! Credential resolution, JWT bearer tokens and role lookups.

mod authenticator;
mod jwt;
mod role_store;

pub use authenticator::{AuthFailure, CredentialAuthenticator, TierDefaults, API_KEY_HEADER};
pub use jwt::{JwtClaims, JwtConfig, JwtService};
pub use role_store::{InMemoryRoleStore, PostgresRoleStore};
