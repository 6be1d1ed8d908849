//! Authentication domain
//!
//! Identities, permission sets, the role table and the identity-provider
//! collaborator traits.

mod context;
mod permission;
mod provider;

pub use context::{ApiKeyPrincipal, AuthContext, Identity, PermissionDenied, UserPrincipal};
pub use permission::{has_permission, PermissionSet, Role, SUPERUSER_PERMISSION};
pub use provider::{RoleStore, TokenError, TokenPrincipal, TokenValidator};
#[cfg(test)]
pub use provider::{MockRoleStore, MockTokenValidator};
