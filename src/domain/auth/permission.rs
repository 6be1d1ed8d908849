//! Capability strings and the role → permission table

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Capability that grants every permission
pub const SUPERUSER_PERMISSION: &str = "admin:all";

const PUBLIC_PERMISSIONS: &[&str] = &["read:public", "read:community"];

const USER_PERMISSIONS: &[&str] = &[
    "write:community",
    "read:profile:own",
    "write:profile:own",
    "read:glucose:own",
    "write:glucose:own",
    "read:insulin:own",
    "write:insulin:own",
    "read:food:own",
    "write:food:own",
    "read:keys:own",
    "write:keys:own",
];

const ADMIN_PERMISSIONS: &[&str] = &["read:*", "write:*", SUPERUSER_PERMISSION];

/// Set of capability strings such as `read:community` or `write:profile:own`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, permission: impl Into<String>) {
        self.0.insert(permission.into());
    }

    pub fn with(mut self, permission: impl Into<String>) -> Self {
        self.insert(permission);
        self
    }

    pub fn extend(&mut self, other: &PermissionSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Check whether this set grants `required`
    pub fn allows(&self, required: &str) -> bool {
        has_permission(self, required)
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Permission check: exact match, `<action>:*` wildcard, or the superuser capability.
pub fn has_permission(permissions: &PermissionSet, required: &str) -> bool {
    if permissions.contains(SUPERUSER_PERMISSION) || permissions.contains(required) {
        return true;
    }

    match required.split_once(':') {
        Some((action, _)) if !action.is_empty() => {
            permissions.contains(&format!("{}:*", action))
        }
        _ => false,
    }
}

/// Principal role, ordered from least to most privileged
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Public,
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    /// Permissions granted to the role, including those of every lesser role
    pub fn permissions(&self) -> PermissionSet {
        let mut set: PermissionSet = PUBLIC_PERMISSIONS.iter().copied().collect();

        if *self >= Role::User {
            set.extend(&USER_PERMISSIONS.iter().copied().collect());
        }

        if *self >= Role::Admin {
            set.extend(&ADMIN_PERMISSIONS.iter().copied().collect());
        }

        set
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(DomainError::validation(format!("Unknown role '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> PermissionSet {
        items.iter().copied().collect()
    }

    #[test]
    fn test_exact_match() {
        let perms = set(&["read:community"]);
        assert!(has_permission(&perms, "read:community"));
        assert!(!has_permission(&perms, "write:community"));
    }

    #[test]
    fn test_action_wildcard() {
        let perms = set(&["read:*"]);
        assert!(has_permission(&perms, "read:community"));
        assert!(has_permission(&perms, "read:profile:own"));
        assert!(!has_permission(&perms, "write:profile:own"));
    }

    #[test]
    fn test_wildcard_does_not_match_prefix_without_separator() {
        let perms = set(&["read:*"]);
        assert!(!has_permission(&perms, "readonly"));
        assert!(!has_permission(&perms, "reader:community"));
    }

    #[test]
    fn test_superuser_grants_everything() {
        let perms = set(&[SUPERUSER_PERMISSION]);
        assert!(has_permission(&perms, "write:glucose:own"));
        assert!(has_permission(&perms, "anything"));
    }

    #[test]
    fn test_no_implicit_elevation() {
        let perms = set(&["write:profile:own"]);
        assert!(!has_permission(&perms, "read:profile:own"));
        assert!(!has_permission(&perms, "write:profile:any"));
        assert!(!has_permission(&PermissionSet::new(), "read:public"));
    }

    #[test]
    fn test_role_hierarchy_is_cumulative() {
        let public = Role::Public.permissions();
        let user = Role::User.permissions();
        let admin = Role::Admin.permissions();

        assert!(public.iter().all(|p| user.contains(p)));
        assert!(user.iter().all(|p| admin.contains(p)));
        assert!(!public.allows("write:community"));
        assert!(user.allows("write:glucose:own"));
        assert!(!user.allows("read:admin:dashboard"));
        assert!(admin.allows("read:admin:dashboard"));
    }

    #[test]
    fn test_missing_role_defaults_to_user() {
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" user ".parse::<Role>().unwrap(), Role::User);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_permission_set_serializes_as_list() {
        let perms = set(&["write:x", "read:x"]);
        let json = serde_json::to_string(&perms).unwrap();
        assert_eq!(json, r#"["read:x","write:x"]"#);
    }
}
