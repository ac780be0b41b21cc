//! Role and access-level bitmasks
//!
//! Role `i` of the ordered role list owns bit `1 << i`. An access level is
//! the OR of the bits of the roles it admits, or every role bit for the
//! wildcard. A request is admitted when the two masks share a bit.
//!
//! Role order determines every mask, so the role list is append-only
//! configuration and both tables are computed once at startup.

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Marker admitting every defined role
pub const WILDCARD: &str = "*";

/// Name of the role given to anonymous callers
pub const PUBLIC_ROLE: &str = "public";

/// Access level assumed by routes that declare none
pub const DEFAULT_ACCESS_LEVEL: &str = "public";

/// Role bits live in a 32-bit mask; bit 31 is kept clear
pub const MAX_ROLES: usize = 31;

/// Authorization model errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("At most {max} roles are supported, {count} configured")]
    TooManyRoles { count: usize, max: usize },

    #[error("The role list must start with \"public\"")]
    MissingPublicRole,

    #[error("Role \"{0}\" is declared more than once")]
    DuplicateRole(String),

    #[error("Access level \"{level}\" references unknown role \"{role}\"")]
    UnknownRole { level: String, role: String },

    #[error("Unknown access level \"{0}\"")]
    UnknownAccessLevel(String),
}

/// The roles an access level admits
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum AccessLevelSpec {
    /// The wildcard string `"*"` (any other string is treated as one role)
    Wildcard(String),
    /// Explicit role names
    Roles(Vec<String>),
}

impl AccessLevelSpec {
    pub fn wildcard() -> Self {
        AccessLevelSpec::Wildcard(WILDCARD.to_string())
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AccessLevelSpec::Roles(roles.into_iter().map(Into::into).collect())
    }
}

/// A named role and its bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Role<'a> {
    pub title: &'a str,
    pub bit_mask: u32,
}

/// Pure admission check
#[inline]
pub fn is_admitted(access_level_mask: u32, role_mask: u32) -> bool {
    access_level_mask & role_mask != 0
}

/// Bitmask tables for roles and access levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControl {
    roles: Vec<String>,
    role_masks: HashMap<String, u32>,
    level_masks: HashMap<String, u32>,
}

impl AccessControl {
    /// Build the tables
    ///
    /// Fails on more than [`MAX_ROLES`] roles, a list not starting with
    /// `public`, duplicate roles, or access levels naming unknown roles.
    pub fn new(
        roles: &[String],
        access_levels: &BTreeMap<String, AccessLevelSpec>,
    ) -> Result<Self, AuthError> {
        if roles.len() > MAX_ROLES {
            return Err(AuthError::TooManyRoles {
                count: roles.len(),
                max: MAX_ROLES,
            });
        }
        if roles.first().map(String::as_str) != Some(PUBLIC_ROLE) {
            return Err(AuthError::MissingPublicRole);
        }

        let mut role_masks = HashMap::with_capacity(roles.len());
        for (i, role) in roles.iter().enumerate() {
            if role_masks.insert(role.clone(), 1u32 << i).is_some() {
                return Err(AuthError::DuplicateRole(role.clone()));
            }
        }

        let all_roles = (1u32 << roles.len()) - 1;
        let mut level_masks = HashMap::with_capacity(access_levels.len());
        for (level, spec) in access_levels {
            let mask = match spec {
                AccessLevelSpec::Wildcard(marker) if marker == WILDCARD => all_roles,
                AccessLevelSpec::Wildcard(role) => {
                    Self::mask_of(&role_masks, level, std::slice::from_ref(role))?
                }
                AccessLevelSpec::Roles(admitted) => Self::mask_of(&role_masks, level, admitted)?,
            };
            level_masks.insert(level.clone(), mask);
        }

        Ok(Self {
            roles: roles.to_vec(),
            role_masks,
            level_masks,
        })
    }

    fn mask_of(
        role_masks: &HashMap<String, u32>,
        level: &str,
        admitted: &[String],
    ) -> Result<u32, AuthError> {
        admitted.iter().try_fold(0u32, |mask, role| {
            role_masks
                .get(role)
                .map(|bit| mask | bit)
                .ok_or_else(|| AuthError::UnknownRole {
                    level: level.to_string(),
                    role: role.clone(),
                })
        })
    }

    /// The default `[public, user, staff, admin]` model
    pub fn standard() -> Self {
        let roles: Vec<String> = default_roles();
        let levels = default_access_levels();
        // The default tables are well-formed
        match Self::new(&roles, &levels) {
            Ok(control) => control,
            Err(_) => Self {
                roles: Vec::new(),
                role_masks: HashMap::new(),
                level_masks: HashMap::new(),
            },
        }
    }

    /// Roles in bit order
    pub fn roles(&self) -> impl Iterator<Item = Role<'_>> {
        self.roles.iter().enumerate().map(|(i, title)| Role {
            title,
            bit_mask: 1 << i,
        })
    }

    pub fn role_mask(&self, role: &str) -> Option<u32> {
        self.role_masks.get(role).copied()
    }

    pub fn access_level_mask(&self, level: &str) -> Option<u32> {
        self.level_masks.get(level).copied()
    }

    pub fn has_access_level(&self, level: &str) -> bool {
        self.level_masks.contains_key(level)
    }

    /// Admission by name: unknown role or level is an error, not a denial
    pub fn admits(&self, access_level: &str, role: &str) -> Result<bool, AuthError> {
        let level = self
            .access_level_mask(access_level)
            .ok_or_else(|| AuthError::UnknownAccessLevel(access_level.to_string()))?;
        let role_mask = self.role_mask(role).ok_or_else(|| AuthError::UnknownRole {
            level: access_level.to_string(),
            role: role.to_string(),
        })?;
        Ok(is_admitted(level, role_mask))
    }
}

/// Default role list
pub fn default_roles() -> Vec<String> {
    ["public", "user", "staff", "admin"]
        .iter()
        .map(|r| r.to_string())
        .collect()
}

/// Default access levels
pub fn default_access_levels() -> BTreeMap<String, AccessLevelSpec> {
    let mut levels = BTreeMap::new();
    levels.insert("public".to_string(), AccessLevelSpec::wildcard());
    levels.insert("anon".to_string(), AccessLevelSpec::roles(["public"]));
    levels.insert(
        "user".to_string(),
        AccessLevelSpec::roles(["user", "staff", "admin"]),
    );
    levels.insert("staff".to_string(), AccessLevelSpec::roles(["staff", "admin"]));
    levels.insert("admin".to_string(), AccessLevelSpec::roles(["admin"]));
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_role_bits() {
        let control = AccessControl::standard();
        let bits: Vec<(String, u32)> = control
            .roles()
            .map(|r| (r.title.to_string(), r.bit_mask))
            .collect();
        assert_eq!(
            bits,
            vec![
                ("public".to_string(), 1),
                ("user".to_string(), 2),
                ("staff".to_string(), 4),
                ("admin".to_string(), 8),
            ]
        );
    }

    #[test]
    fn test_standard_access_levels() {
        let control = AccessControl::standard();
        assert_eq!(control.access_level_mask("public"), Some(15));
        assert_eq!(control.access_level_mask("anon"), Some(1));
        assert_eq!(control.access_level_mask("user"), Some(14));
        assert_eq!(control.access_level_mask("staff"), Some(12));
        assert_eq!(control.access_level_mask("admin"), Some(8));
    }

    #[test]
    fn test_user_denied_on_admin_route() {
        let control = AccessControl::standard();
        assert_eq!(control.admits("admin", "user"), Ok(false));
        assert_eq!(control.admits("admin", "admin"), Ok(true));
        assert_eq!(control.admits("anon", "user"), Ok(false));
        assert_eq!(control.admits("public", "public"), Ok(true));
    }

    #[test]
    fn test_rejects_bad_role_lists() {
        let levels = BTreeMap::new();
        let too_many: Vec<String> = std::iter::once("public".to_string())
            .chain((1..=MAX_ROLES).map(|i| format!("r{}", i)))
            .collect();
        assert!(matches!(
            AccessControl::new(&too_many, &levels),
            Err(AuthError::TooManyRoles { .. })
        ));
        assert_eq!(
            AccessControl::new(&["user".to_string()], &levels),
            Err(AuthError::MissingPublicRole)
        );
        assert_eq!(
            AccessControl::new(&["public".to_string(), "public".to_string()], &levels),
            Err(AuthError::DuplicateRole("public".to_string()))
        );
    }

    #[test]
    fn test_rejects_unknown_role_in_level() {
        let mut levels = BTreeMap::new();
        levels.insert("ops".to_string(), AccessLevelSpec::roles(["operator"]));
        let err = AccessControl::new(&default_roles(), &levels).unwrap_err();
        assert_eq!(
            err,
            AuthError::UnknownRole {
                level: "ops".to_string(),
                role: "operator".to_string()
            }
        );
    }

    #[test]
    fn test_thirty_one_roles_fit() {
        let roles: Vec<String> = std::iter::once("public".to_string())
            .chain((1..MAX_ROLES).map(|i| format!("r{}", i)))
            .collect();
        let mut levels = BTreeMap::new();
        levels.insert("all".to_string(), AccessLevelSpec::wildcard());
        let control = AccessControl::new(&roles, &levels).unwrap();
        assert_eq!(control.access_level_mask("all"), Some(0x7fff_ffff));
        assert_eq!(control.role_mask("r30"), Some(1 << 30));
    }

    #[test]
    fn test_access_level_spec_deserializes_wildcard_and_list() {
        let spec: AccessLevelSpec = serde_json::from_str("\"*\"").unwrap();
        assert_eq!(spec, AccessLevelSpec::wildcard());
        let spec: AccessLevelSpec = serde_json::from_str("[\"staff\"]").unwrap();
        assert_eq!(spec, AccessLevelSpec::roles(["staff"]));
    }
}
