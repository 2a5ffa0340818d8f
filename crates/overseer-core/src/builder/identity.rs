// Identity views. Users exist once the identity server lists them; the
// control plane only adds whether a matching platform user exists.

use std::collections::HashMap;

use serde_json::Value;

use super::{Entry, Lookup, detail, entry};
use crate::model::{Collection, SourceRecord, SourceSet};

pub(super) fn users(sources: &SourceSet) -> Vec<Entry> {
    let cp_users = Lookup::of(sources, Collection::Users);

    sources
        .records(Collection::IdentityUsers)
        .iter()
        .filter_map(|user| {
            let id = user.str("id")?;
            let cp_user = cp_users.get(Some(id));
            let display_name = user.value("name").map_or(Value::Null, |name| {
                let given = name.get("givenName").and_then(Value::as_str).unwrap_or_default();
                let family = name.get("familyName").and_then(Value::as_str).unwrap_or_default();
                let full = format!("{given} {family}");
                let full = full.trim();
                if full.is_empty() {
                    Value::Null
                } else {
                    Value::String(full.to_owned())
                }
            });
            let email = user
                .value("emails")
                .and_then(Value::as_array)
                .and_then(|emails| emails.first())
                .and_then(|e| e.get("value"))
                .cloned()
                .unwrap_or(Value::Null);

            let cells = vec![
                user.cell("userName"),
                meta(user, "created"),
                display_name,
                email,
                user.cell("active"),
                user.cell("verified"),
                Value::from(array_len(user, "groups")),
                Value::Bool(cp_user.is_some()),
                meta(user, "lastModified"),
            ];
            let detail = detail([("user", Some(user)), ("control_plane_user", cp_user)]);
            Some(entry(id.to_owned(), cells, detail))
        })
        .collect()
}

pub(super) fn clients(sources: &SourceSet) -> Vec<Entry> {
    sources
        .records(Collection::IdentityClients)
        .iter()
        .filter_map(|client| {
            let id = client.str("client_id")?;
            let cells = vec![
                joined(client, "scope"),
                joined(client, "authorized_grant_types"),
                joined(client, "authorities"),
                client.cell("access_token_validity"),
                client.cell("autoapprove"),
                client.cell("lastModified"),
            ];
            Some(entry(id.to_owned(), cells, detail([("client", Some(client))])))
        })
        .collect()
}

pub(super) fn groups(sources: &SourceSet) -> Vec<Entry> {
    sources
        .records(Collection::IdentityGroups)
        .iter()
        .filter_map(|group| {
            let id = group.str("id")?;
            let cells = vec![
                group.cell("displayName"),
                group.cell("description"),
                Value::from(array_len(group, "members")),
                meta(group, "created"),
                meta(group, "lastModified"),
            ];
            Some(entry(id.to_owned(), cells, detail([("group", Some(group))])))
        })
        .collect()
}

pub(super) fn identity_zones(sources: &SourceSet) -> Vec<Entry> {
    sources
        .records(Collection::IdentityZones)
        .iter()
        .filter_map(|zone| {
            let id = zone.str("id")?;
            let cells = vec![
                zone.cell("name"),
                zone.cell("subdomain"),
                zone.cell("created"),
                zone.cell("last_modified"),
                zone.cell("version"),
                zone.cell("description"),
            ];
            Some(entry(id.to_owned(), cells, detail([("identity_zone", Some(zone))])))
        })
        .collect()
}

pub(super) fn identity_providers(sources: &SourceSet) -> Vec<Entry> {
    let zones: HashMap<&str, &SourceRecord> = sources
        .records(Collection::IdentityZones)
        .iter()
        .filter_map(|z| Some((z.str("id")?, z)))
        .collect();

    sources
        .records(Collection::IdentityProviders)
        .iter()
        .filter_map(|provider| {
            let id = provider.str("id")?;
            let zone = provider
                .str("identityZoneId")
                .and_then(|z| zones.get(z).copied());
            let cells = vec![
                provider.cell("name"),
                provider.cell("originKey"),
                provider.cell("type"),
                provider.cell("active"),
                zone.map_or(Value::Null, |z| z.cell("name")),
                provider.cell("created"),
                provider.cell("last_modified"),
            ];
            let detail = detail([("identity_provider", Some(provider)), ("identity_zone", zone)]);
            Some(entry(id.to_owned(), cells, detail))
        })
        .collect()
}

fn meta(record: &SourceRecord, field: &str) -> Value {
    record
        .value("meta")
        .and_then(|m| m.get(field))
        .cloned()
        .unwrap_or(Value::Null)
}

fn array_len(record: &SourceRecord, field: &str) -> usize {
    record
        .value(field)
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// Comma-joined string array, `null` when absent.
fn joined(record: &SourceRecord, field: &str) -> Value {
    match record.value(field) {
        Some(Value::Array(items)) => Value::String(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::super::fixtures::{cp, obj, set, snapshot};
    use super::super::{build, columns};
    use crate::model::{Collection, NaturalKey, ResourceType, SourceKind, SourceRecord};

    #[test]
    fn users_mark_control_plane_presence() {
        let identity = vec![
            SourceRecord::new(
                Collection::IdentityUsers,
                NaturalKey::Guid("u1".into()),
                obj(json!({
                    "id": "u1", "userName": "admin",
                    "name": { "givenName": "Ada", "familyName": "Admin" },
                    "emails": [{ "value": "ada@example.com" }],
                    "groups": [{ "value": "g1" }, { "value": "g2" }],
                    "meta": { "created": "2026-01-01T00:00:00Z" }
                })),
            ),
            SourceRecord::new(
                Collection::IdentityUsers,
                NaturalKey::Guid("u2".into()),
                obj(json!({ "id": "u2", "userName": "viewer" })),
            ),
        ];
        let sources = set(vec![
            snapshot(SourceKind::Identity, identity, true),
            snapshot(
                SourceKind::ControlPlane,
                vec![cp(Collection::Users, json!({ "guid": "u1", "admin": true }))],
                true,
            ),
        ]);

        let view = build(ResourceType::Users, &sources);
        let ada = view.row("u1").unwrap();
        assert_eq!(ada[1], json!("admin"));
        assert_eq!(ada[2], json!("2026-01-01T00:00:00Z"));
        assert_eq!(ada[3], json!("Ada Admin"));
        assert_eq!(ada[4], json!("ada@example.com"));
        assert_eq!(ada[7], json!(2));
        assert_eq!(ada[columns::USER_IN_CONTROL_PLANE], json!(true));

        let viewer = view.row("u2").unwrap();
        assert_eq!(viewer[3], json!(null));
        assert_eq!(viewer[columns::USER_IN_CONTROL_PLANE], json!(false));
        assert_eq!(view.detail("u2").unwrap()["control_plane_user"], json!(null));
    }

    #[test]
    fn clients_join_scopes() {
        let sources = set(vec![snapshot(
            SourceKind::Identity,
            vec![SourceRecord::new(
                Collection::IdentityClients,
                NaturalKey::Name("cf".into()),
                obj(json!({ "client_id": "cf", "scope": ["openid", "cloud_controller.read"] })),
            )],
            true,
        )]);

        let view = build(ResourceType::Clients, &sources);
        assert_eq!(view.row("cf").unwrap()[1], json!("openid, cloud_controller.read"));
    }

    #[test]
    fn providers_name_their_zone() {
        let record = |collection, id: &str, value| SourceRecord::new(collection, NaturalKey::Guid(id.into()), obj(value));
        let sources = set(vec![snapshot(
            SourceKind::Identity,
            vec![
                record(Collection::IdentityZones, "uaa", json!({ "id": "uaa", "name": "uaa", "subdomain": "" })),
                record(Collection::IdentityProviders, "idp1", json!({
                    "id": "idp1", "name": "LDAP", "originKey": "ldap", "type": "ldap",
                    "active": true, "identityZoneId": "uaa"
                })),
                record(Collection::IdentityProviders, "idp2", json!({
                    "id": "idp2", "originKey": "saml", "identityZoneId": "elsewhere"
                })),
            ],
            true,
        )]);

        let zones = build(ResourceType::IdentityZones, &sources);
        assert_eq!(zones.row("uaa").unwrap()[1], json!("uaa"));

        let providers = build(ResourceType::IdentityProviders, &sources);
        let ldap = providers.row("idp1").unwrap();
        assert_eq!(ldap[2], json!("ldap"));
        assert_eq!(ldap[4], json!(true));
        assert_eq!(ldap[5], json!("uaa"));
        assert_eq!(providers.row("idp2").unwrap()[5], json!(null));
        assert_eq!(providers.detail("idp2").unwrap()["identity_zone"], json!(null));
    }
}
