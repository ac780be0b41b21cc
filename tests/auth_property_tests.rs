//! Property tests for the role model and route namespacing

use package_services::api::{mount_path, namespace_path};
use package_services::auth::roles::{default_access_levels, default_roles, AccessLevelSpec};
use package_services::auth::{is_admitted, AccessControl, AuthError};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn role_names(count: usize) -> Vec<String> {
    std::iter::once("public".to_string())
        .chain((1..count).map(|i| format!("role{}", i)))
        .collect()
}

#[test]
fn test_standard_model_masks() {
    let control = AccessControl::standard();
    assert_eq!(control.role_mask("public"), Some(1));
    assert_eq!(control.role_mask("user"), Some(2));
    assert_eq!(control.role_mask("staff"), Some(4));
    assert_eq!(control.role_mask("admin"), Some(8));
    assert_eq!(control.access_level_mask("admin"), Some(8));
    assert_eq!(control.access_level_mask("public"), Some(15));

    assert_eq!(control.admits("admin", "user"), Ok(false));
    assert_eq!(control.admits("admin", "admin"), Ok(true));
    assert_eq!(control.admits("user", "staff"), Ok(true));
    assert_eq!(control.admits("anon", "user"), Ok(false));
}

#[test]
fn test_unknown_names_are_errors_not_denials() {
    let control = AccessControl::standard();
    assert_eq!(
        control.admits("wizards", "admin"),
        Err(AuthError::UnknownAccessLevel("wizards".into()))
    );
    assert!(matches!(
        control.admits("admin", "root"),
        Err(AuthError::UnknownRole { .. })
    ));
}

#[test]
fn test_role_list_must_start_with_public() {
    let roles = vec!["user".to_string(), "public".to_string()];
    assert_eq!(
        AccessControl::new(&roles, &BTreeMap::new()),
        Err(AuthError::MissingPublicRole)
    );
}

#[test]
fn test_access_level_with_unknown_role_is_rejected() {
    let mut levels = default_access_levels();
    levels.insert("ops".into(), AccessLevelSpec::roles(["sre"]));
    assert!(matches!(
        AccessControl::new(&default_roles(), &levels),
        Err(AuthError::UnknownRole { .. })
    ));
}

proptest! {
    #[test]
    fn admission_iff_masks_share_a_bit(level in any::<u32>(), role in any::<u32>()) {
        prop_assert_eq!(is_admitted(level, role), level & role != 0);
    }

    #[test]
    fn wildcard_admits_every_role(count in 1usize..=31) {
        let roles = role_names(count);
        let mut levels = BTreeMap::new();
        levels.insert("any".to_string(), AccessLevelSpec::wildcard());
        let control = AccessControl::new(&roles, &levels).unwrap();
        for role in &roles {
            prop_assert_eq!(control.admits("any", role), Ok(true));
        }
    }

    #[test]
    fn role_bits_follow_list_order(count in 1usize..=31) {
        let roles = role_names(count);
        let control = AccessControl::new(&roles, &BTreeMap::new()).unwrap();
        for (i, role) in roles.iter().enumerate() {
            prop_assert_eq!(control.role_mask(role), Some(1u32 << i));
        }
    }

    #[test]
    fn explicit_level_admits_exactly_its_roles(
        count in 2usize..=31,
        picks in proptest::collection::vec(any::<bool>(), 31),
    ) {
        let roles = role_names(count);
        let admitted: Vec<String> = roles
            .iter()
            .zip(&picks)
            .filter(|(_, pick)| **pick)
            .map(|(role, _)| role.clone())
            .collect();
        let mut levels = BTreeMap::new();
        levels.insert("picked".to_string(), AccessLevelSpec::Roles(admitted.clone()));
        let control = AccessControl::new(&roles, &levels).unwrap();

        for role in &roles {
            prop_assert_eq!(
                control.admits("picked", role),
                Ok(admitted.contains(role))
            );
        }
    }

    #[test]
    fn namespacing_is_idempotent(
        package in "[a-z][a-z0-9-]{0,12}",
        path in "(/[a-z0-9:]{1,8}){0,4}/?",
    ) {
        let once = namespace_path(&package, &path);
        let prefix = format!("/{}", package);
        prop_assert!(once.starts_with(&prefix));
        prop_assert_eq!(namespace_path(&package, &once), once.clone());
        prop_assert!(!once.contains("//"));
    }

    #[test]
    fn mount_path_never_doubles_slashes(
        mount in "/?([a-z]{1,6}/?){0,2}",
        path in "(/[a-z]{1,6}){1,3}",
    ) {
        let joined = mount_path(&mount, &path);
        prop_assert!(joined.starts_with('/'));
        prop_assert!(!joined.contains("//"));
        prop_assert!(joined.ends_with(&path));
    }
}
