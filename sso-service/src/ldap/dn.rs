//! DN parsing for the directory bridge.
//!
//! The bridge speaks exactly one DN shape for users,
//! `uid={username},ou=users,o={tenant},{baseDN}`, matched
//! case-insensitively on attribute names and structural values.

/// Tenant and username out of a user DN. None for anything that does not
/// match the expected shape under the configured base.
pub fn parse_user_dn(dn: &str, base_dn: &str) -> Option<(String, String)> {
    let components: Vec<&str> = dn.split(',').map(|c| c.trim()).collect();
    let base_components: Vec<&str> = base_dn.split(',').map(|c| c.trim()).collect();

    if components.len() != base_components.len() + 3 {
        return None;
    }

    let (prefix, suffix) = components.split_at(3);
    if !suffix
        .iter()
        .zip(base_components.iter())
        .all(|(a, b)| a.eq_ignore_ascii_case(b))
    {
        return None;
    }

    let username = attribute_value(prefix[0], "uid")?;
    if !prefix[1].eq_ignore_ascii_case("ou=users") {
        return None;
    }
    let tenant = attribute_value(prefix[2], "o")?;

    Some((tenant, username))
}

/// The `o=` component of a search base, wherever it sits.
pub fn tenant_from_base(base: &str) -> Option<String> {
    base.split(',')
        .map(|c| c.trim())
        .find_map(|c| attribute_value(c, "o"))
}

/// DN under which a user entry is published.
pub fn user_dn(username: &str, tenant: &str, base_dn: &str) -> String {
    format!("uid={username},ou=users,o={tenant},{base_dn}")
}

/// DN used for `memberOf` values.
pub fn group_dn(group: &str, tenant: &str, base_dn: &str) -> String {
    format!("cn={group},ou=groups,o={tenant},{base_dn}")
}

fn attribute_value(component: &str, attribute: &str) -> Option<String> {
    let (name, value) = component.split_once('=')?;
    if !name.trim().eq_ignore_ascii_case(attribute) {
        return None;
    }
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "dc=sso,dc=local";

    #[test]
    fn parses_a_well_formed_user_dn() {
        assert_eq!(
            parse_user_dn("uid=alice,ou=users,o=acme,dc=sso,dc=local", BASE),
            Some(("acme".to_string(), "alice".to_string()))
        );
    }

    #[test]
    fn parsing_is_case_insensitive_on_structure() {
        assert_eq!(
            parse_user_dn("UID=alice,OU=Users,O=acme,DC=sso,DC=local", BASE),
            Some(("acme".to_string(), "alice".to_string()))
        );
    }

    #[test]
    fn rejects_wrong_shapes() {
        assert!(parse_user_dn("uid=alice,o=acme,dc=sso,dc=local", BASE).is_none());
        assert!(parse_user_dn("uid=alice,ou=groups,o=acme,dc=sso,dc=local", BASE).is_none());
        assert!(parse_user_dn("uid=alice,ou=users,o=acme,dc=other,dc=local", BASE).is_none());
        assert!(parse_user_dn("cn=admin,dc=sso,dc=local", BASE).is_none());
        assert!(parse_user_dn("uid=,ou=users,o=acme,dc=sso,dc=local", BASE).is_none());
    }

    #[test]
    fn extracts_tenant_from_search_bases() {
        assert_eq!(
            tenant_from_base("ou=users,o=acme,dc=sso,dc=local"),
            Some("acme".to_string())
        );
        assert_eq!(
            tenant_from_base("O=Initech,dc=sso,dc=local"),
            Some("Initech".to_string())
        );
        assert_eq!(tenant_from_base("dc=sso,dc=local"), None);
    }
}
