// Relationship views: which user holds which role in an organization or
// space, and which spaces each security group is bound to. Rows are keyed
// by the full relationship path (`guid/role/user`, `group/space`) so a
// removal can be checked against exactly one row.

use std::collections::HashMap;

use serde_json::Value;

use super::{Entry, Lookup, detail, entry, target};
use crate::model::{Collection, SourceRecord, SourceSet};

/// Identity users by id, for names the control plane leaves out.
fn identity_users(sources: &SourceSet) -> HashMap<&str, &SourceRecord> {
    sources
        .records(Collection::IdentityUsers)
        .iter()
        .filter_map(|u| Some((u.str("id")?, u)))
        .collect()
}

/// The control-plane username, else the identity server's `userName`.
fn username(role: &SourceRecord, identity: Option<&SourceRecord>) -> Value {
    match role.value("username") {
        Some(Value::String(name)) => Value::String(name.clone()),
        _ => identity.map_or(Value::Null, |u| u.cell("userName")),
    }
}

pub(super) fn organization_roles(sources: &SourceSet) -> Vec<Entry> {
    let orgs = Lookup::of(sources, Collection::Organizations);
    let users = Lookup::of(sources, Collection::Users);
    let identity = identity_users(sources);

    sources
        .records(Collection::OrganizationRoles)
        .iter()
        .filter_map(|role| {
            let key = role.key.to_string();
            let org = orgs.get(role.str("organization_guid"));
            let user_guid = role.str("user_guid")?;
            let identity_user = identity.get(user_guid).copied();

            let cells = vec![
                org.map_or(Value::Null, |o| o.cell("name")),
                role.cell("organization_guid"),
                username(role, identity_user),
                role.cell("user_guid"),
                role.cell("role"),
            ];
            let detail = detail([
                ("role", Some(role)),
                ("organization", org),
                ("user", users.get(Some(user_guid))),
                ("identity_user", identity_user),
            ]);
            Some(entry(key, cells, detail))
        })
        .collect()
}

pub(super) fn space_roles(sources: &SourceSet) -> Vec<Entry> {
    let orgs = Lookup::of(sources, Collection::Organizations);
    let spaces = Lookup::of(sources, Collection::Spaces);
    let users = Lookup::of(sources, Collection::Users);
    let identity = identity_users(sources);

    sources
        .records(Collection::SpaceRoles)
        .iter()
        .filter_map(|role| {
            let key = role.key.to_string();
            let space = spaces.get(role.str("space_guid"));
            let user_guid = role.str("user_guid")?;
            let identity_user = identity.get(user_guid).copied();

            let cells = vec![
                space.map_or(Value::Null, |s| s.cell("name")),
                role.cell("space_guid"),
                target(space, &orgs),
                username(role, identity_user),
                role.cell("user_guid"),
                role.cell("role"),
            ];
            let detail = detail([
                ("role", Some(role)),
                ("space", space),
                ("organization", space.and_then(|s| orgs.get(s.str("organization_guid")))),
                ("user", users.get(Some(user_guid))),
                ("identity_user", identity_user),
            ]);
            Some(entry(key, cells, detail))
        })
        .collect()
}

pub(super) fn security_groups_spaces(sources: &SourceSet) -> Vec<Entry> {
    let groups = Lookup::of(sources, Collection::SecurityGroups);
    let spaces = Lookup::of(sources, Collection::Spaces);
    let orgs = Lookup::of(sources, Collection::Organizations);

    sources
        .records(Collection::SecurityGroupSpaces)
        .iter()
        .map(|binding| {
            let group = groups.get(binding.str("security_group_guid"));
            let space = spaces.get(binding.str("space_guid"));
            let cells = vec![
                group.map_or(Value::Null, |g| g.cell("name")),
                binding.cell("security_group_guid"),
                space.map_or(Value::Null, |s| s.cell("name")),
                binding.cell("space_guid"),
                target(space, &orgs),
            ];
            let detail = detail([
                ("security_group", group),
                ("space", space),
                ("organization", space.and_then(|s| orgs.get(s.str("organization_guid")))),
            ]);
            entry(binding.key.to_string(), cells, detail)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::super::build;
    use super::super::fixtures::{cp, obj, platform, set, snapshot};
    use crate::model::{Collection, NaturalKey, ResourceType, SourceKind, SourceRecord};

    fn role(collection: Collection, scope: &str, role: &str, user: &str, username: Value) -> SourceRecord {
        let scope_field = if collection == Collection::OrganizationRoles {
            "organization_guid"
        } else {
            "space_guid"
        };
        SourceRecord::new(
            collection,
            NaturalKey::Role {
                scope: scope.into(),
                role: role.into(),
                user: user.into(),
            },
            obj(json!({ scope_field: scope, "role": role, "user_guid": user, "username": username })),
        )
    }

    fn group_space(group: &str, space: &str) -> SourceRecord {
        SourceRecord::new(
            Collection::SecurityGroupSpaces,
            NaturalKey::GroupSpace {
                group: group.into(),
                space: space.into(),
            },
            obj(json!({ "security_group_guid": group, "space_guid": space })),
        )
    }

    #[test]
    fn organization_roles_are_keyed_by_relationship() {
        let mut records = platform();
        records.extend([
            cp(Collection::Users, json!({ "guid": "u1", "admin": false })),
            role(Collection::OrganizationRoles, "o1", "auditors", "u1", json!("jdoe")),
            role(Collection::OrganizationRoles, "o1", "managers", "u1", json!("jdoe")),
        ]);
        let sources = set(vec![snapshot(SourceKind::ControlPlane, records, true)]);

        let view = build(ResourceType::OrganizationRoles, &sources);
        assert_eq!(view.len(), 2);
        let row = view.row("o1/auditors/u1").unwrap();
        assert_eq!(row[1], json!("acme"));
        assert_eq!(row[3], json!("jdoe"));
        assert_eq!(row[5], json!("auditors"));

        let detail = view.detail("o1/managers/u1").unwrap();
        assert_eq!(detail["organization"]["name"], json!("acme"));
        assert_eq!(detail["user"]["guid"], json!("u1"));
        assert_eq!(detail["identity_user"], Value::Null);
    }

    #[test]
    fn space_role_names_fall_back_to_the_identity_server() {
        let mut records = platform();
        records.push(role(Collection::SpaceRoles, "s1", "developers", "u2", Value::Null));
        let identity = vec![SourceRecord::new(
            Collection::IdentityUsers,
            NaturalKey::Guid("u2".into()),
            obj(json!({ "id": "u2", "userName": "asmith" })),
        )];
        let sources = set(vec![
            snapshot(SourceKind::ControlPlane, records, true),
            snapshot(SourceKind::Identity, identity, true),
        ]);

        let view = build(ResourceType::SpaceRoles, &sources);
        let row = view.row("s1/developers/u2").unwrap();
        assert_eq!(row[1], json!("dev"));
        assert_eq!(row[3], json!("acme/dev"));
        assert_eq!(row[4], json!("asmith"));
        assert_eq!(row[6], json!("developers"));
    }

    #[test]
    fn security_group_bindings_join_group_and_space() {
        let mut records = platform();
        records.extend([
            cp(Collection::SecurityGroups, json!({ "guid": "sg1", "name": "public_networks" })),
            group_space("sg1", "s2"),
        ]);
        let sources = set(vec![snapshot(SourceKind::ControlPlane, records, true)]);

        let view = build(ResourceType::SecurityGroupsSpaces, &sources);
        assert_eq!(view.len(), 1);
        let row = view.row("sg1/s2").unwrap();
        assert_eq!(row[1], json!("public_networks"));
        assert_eq!(row[3], json!("prod"));
        assert_eq!(row[5], json!("acme/prod"));
        assert_eq!(
            view.detail("sg1/s2").unwrap()["organization"]["guid"],
            json!("o1")
        );
    }
}
