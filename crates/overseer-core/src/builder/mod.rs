// ── View model builders ──
//
// Pure functions from one `SourceSet` to one `ViewModel`. Each builder
// emits `(key, ViewEntry)` pairs in a single pass, so the table row and
// the detail of an entity always come from the same join. Unresolved
// references render as JSON `null`.

mod cloud;
mod components;
mod identity;
mod relations;
mod services;

use std::collections::HashMap;

use chrono::Utc;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::model::{Collection, ResourceType, SourceRecord, SourceSet, ViewEntry, ViewModel};

/// Column positions other modules read back out of built rows.
pub mod columns {
    pub const APP_NAME: usize = 1;
    pub const APP_STATE: usize = 3;
    pub const APP_INSTANCES: usize = 5;
    pub const APP_RUNNING_INSTANCES: usize = 6;
    pub const DOMAIN_SHARED: usize = 3;
    pub const USER_IN_CONTROL_PLANE: usize = 8;
}

/// Build the view of `resource` from one consistent set of snapshots.
pub fn build(resource: ResourceType, sources: &SourceSet) -> ViewModel {
    let mut entries = match resource {
        ResourceType::Applications => cloud::applications(sources),
        ResourceType::ApplicationInstances => cloud::application_instances(sources),
        ResourceType::Organizations => cloud::organizations(sources),
        ResourceType::Spaces => cloud::spaces(sources),
        ResourceType::Routes => cloud::routes(sources),
        ResourceType::Domains => cloud::domains(sources),
        ResourceType::Quotas => cloud::quotas(sources),
        ResourceType::SpaceQuotas => cloud::space_quotas(sources),
        ResourceType::Buildpacks => cloud::buildpacks(sources),
        ResourceType::FeatureFlags => cloud::feature_flags(sources),
        ResourceType::Stacks => cloud::stacks(sources),
        ResourceType::SecurityGroups => cloud::security_groups(sources),
        ResourceType::SecurityGroupsSpaces => relations::security_groups_spaces(sources),
        ResourceType::Events => cloud::events(sources),
        ResourceType::OrganizationRoles => relations::organization_roles(sources),
        ResourceType::SpaceRoles => relations::space_roles(sources),
        ResourceType::Services => services::services(sources),
        ResourceType::ServicePlans => services::service_plans(sources),
        ResourceType::ServiceInstances => services::service_instances(sources),
        ResourceType::ServiceBrokers => services::service_brokers(sources),
        ResourceType::ServiceBindings => services::service_bindings(sources),
        ResourceType::ServiceKeys => services::service_keys(sources),
        ResourceType::ServicePlanVisibilities => services::service_plan_visibilities(sources),
        ResourceType::Users => identity::users(sources),
        ResourceType::Clients => identity::clients(sources),
        ResourceType::Groups => identity::groups(sources),
        ResourceType::IdentityZones => identity::identity_zones(sources),
        ResourceType::IdentityProviders => identity::identity_providers(sources),
        ResourceType::Components => components::components(sources),
        ResourceType::Deas => components::deas(sources),
        ResourceType::Cells => components::cells(sources),
        ResourceType::Routers => components::routers(sources),
        ResourceType::HealthManagers => components::health_managers(sources),
        ResourceType::CloudControllers => components::cloud_controllers(sources),
        ResourceType::Gateways => components::gateways(sources),
    };
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    ViewModel {
        resource,
        generation: sources.epoch,
        connected: sources.connected(resource.dependencies()),
        built_at: Utc::now(),
        entries: entries.into_iter().collect::<IndexMap<_, _>>(),
    }
}

pub(crate) type Entry = (String, ViewEntry);

/// A row whose first cell is its key.
pub(crate) fn entry(key: String, mut cells: Vec<Value>, detail: Map<String, Value>) -> Entry {
    cells.insert(0, Value::String(key.clone()));
    (key, ViewEntry { cells, detail })
}

/// Detail object with one member per related record; missing ones are
/// `null`.
pub(crate) fn detail<const N: usize>(parts: [(&str, Option<&SourceRecord>); N]) -> Map<String, Value> {
    parts
        .into_iter()
        .map(|(name, record)| {
            let value = record.map_or(Value::Null, |r| Value::Object(r.fields.clone()));
            (name.to_owned(), value)
        })
        .collect()
}

// ── Joins ────────────────────────────────────────────────────────────

/// GUID index over one control-plane collection.
pub(crate) struct Lookup<'a> {
    by_guid: HashMap<&'a str, &'a SourceRecord>,
}

impl<'a> Lookup<'a> {
    pub(crate) fn of(sources: &'a SourceSet, collection: Collection) -> Self {
        Self {
            by_guid: sources
                .records(collection)
                .iter()
                .filter_map(|r| Some((r.str("guid")?, r)))
                .collect(),
        }
    }

    pub(crate) fn get(&self, guid: Option<&str>) -> Option<&'a SourceRecord> {
        guid.and_then(|g| self.by_guid.get(g).copied())
    }

    pub(crate) fn contains(&self, guid: &str) -> bool {
        self.by_guid.contains_key(guid)
    }

    /// `field` of the referenced record, `null` when unresolved.
    pub(crate) fn field(&self, guid: Option<&str>, field: &str) -> Value {
        self.get(guid).map_or(Value::Null, |r| r.cell(field))
    }
}

/// Number of records per value of a reference field.
pub(crate) fn count_by<'a>(records: &'a [SourceRecord], field: &str) -> HashMap<&'a str, u64> {
    let mut counts = HashMap::new();
    for record in records {
        if let Some(value) = record.str(field) {
            *counts.entry(value).or_insert(0) += 1;
        }
    }
    counts
}

pub(crate) fn count_of(counts: &HashMap<&str, u64>, key: &str) -> Value {
    Value::from(counts.get(key).copied().unwrap_or(0))
}

/// `org/space` label for a space, `null` when either side is missing.
pub(crate) fn target(space: Option<&SourceRecord>, orgs: &Lookup<'_>) -> Value {
    let Some(space) = space else {
        return Value::Null;
    };
    let org = orgs.get(space.str("organization_guid"));
    match (org.and_then(|o| o.str("name")), space.str("name")) {
        (Some(org), Some(space)) => Value::String(format!("{org}/{space}")),
        _ => Value::Null,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use serde_json::{Map, Value, json};

    use crate::model::{Collection, NaturalKey, SourceKind, SourceRecord, SourceSet, SourceSnapshot};

    pub(crate) fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    pub(crate) fn cp(collection: Collection, value: Value) -> SourceRecord {
        let fields = obj(value);
        let guid = fields
            .get("guid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        SourceRecord::new(collection, NaturalKey::Guid(guid), fields)
    }

    pub(crate) fn snapshot(kind: SourceKind, records: Vec<SourceRecord>, connected: bool) -> SourceSnapshot {
        let mut snap = SourceSnapshot::pending(kind);
        snap.records = Arc::new(SourceSnapshot::group(records));
        snap.connected = connected;
        snap.generation = 1;
        snap
    }

    pub(crate) fn set(snapshots: Vec<SourceSnapshot>) -> SourceSet {
        let mut set = SourceSet::default();
        for snap in snapshots {
            set = set.with_snapshot(snap);
        }
        set
    }

    /// A small platform: one org with two spaces, three apps (two started).
    pub(crate) fn platform() -> Vec<SourceRecord> {
        vec![
            cp(Collection::QuotaDefinitions, json!({ "guid": "q1", "name": "default", "memory_limit": 10240 })),
            cp(Collection::SpaceQuotaDefinitions, json!({ "guid": "sq1", "name": "small", "organization_guid": "o1" })),
            cp(Collection::Organizations, json!({
                "guid": "o1", "name": "acme", "status": "active",
                "quota_definition_guid": "q1", "created_at": "2026-01-01T00:00:00Z", "updated_at": null
            })),
            cp(Collection::Spaces, json!({
                "guid": "s1", "name": "dev", "organization_guid": "o1", "space_quota_definition_guid": "sq1"
            })),
            cp(Collection::Spaces, json!({
                "guid": "s2", "name": "prod", "organization_guid": "o1", "space_quota_definition_guid": null
            })),
            cp(Collection::Apps, json!({
                "guid": "a1", "name": "web", "state": "STARTED", "package_state": "STAGED",
                "instances": 2, "memory": 256, "disk_quota": 1024, "space_guid": "s1",
                "buildpack": null, "detected_buildpack": "ruby"
            })),
            cp(Collection::Apps, json!({
                "guid": "a2", "name": "worker", "state": "STARTED", "package_state": "STAGED",
                "instances": 1, "memory": 512, "disk_quota": 1024, "space_guid": "s2"
            })),
            cp(Collection::Apps, json!({
                "guid": "a3", "name": "orphan", "state": "STOPPED", "instances": 3,
                "memory": 128, "space_guid": "gone"
            })),
            cp(Collection::Routes, json!({ "guid": "r1", "host": "www", "path": "", "domain_guid": "d1", "space_guid": "s1" })),
            cp(Collection::Domains, json!({ "guid": "d1", "name": "example.com", "shared": true })),
        ]
    }
}
