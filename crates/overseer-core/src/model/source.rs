// ── Source-side records and snapshots ──
//
// Everything a poll produces. Records are tagged with the source that
// fetched them and the collection they belong to; builders match on those
// tags instead of probing for optional fields.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString};

// ── SourceKind ───────────────────────────────────────────────────────

/// One of the external systems that contribute records.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    ControlPlane,
    Identity,
    Telemetry,
    Firehose,
}

// ── Collection ───────────────────────────────────────────────────────

/// Record family inside one source.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    // Control plane
    Organizations,
    Spaces,
    Apps,
    Routes,
    Domains,
    QuotaDefinitions,
    SpaceQuotaDefinitions,
    Buildpacks,
    FeatureFlags,
    Stacks,
    Services,
    ServicePlans,
    ServiceInstances,
    ServiceBrokers,
    ServiceBindings,
    ServiceKeys,
    SecurityGroups,
    ServicePlanVisibilities,
    Events,
    Users,
    /// One record per (organization, role, user).
    OrganizationRoles,
    /// One record per (space, role, user).
    SpaceRoles,
    /// One record per space a security group is bound to.
    SecurityGroupSpaces,
    // Identity
    IdentityUsers,
    IdentityGroups,
    IdentityClients,
    IdentityZones,
    IdentityProviders,
    // Telemetry
    Components,
    DeaInstances,
    // Firehose
    FirehoseComponents,
    ContainerMetrics,
}

impl Collection {
    /// Paged control-plane collections and their listing paths.
    pub const CONTROL_PLANE_PAGED: &'static [(Collection, &'static str)] = &[
        (Collection::Organizations, "v2/organizations"),
        (Collection::Spaces, "v2/spaces"),
        (Collection::Apps, "v2/apps"),
        (Collection::Routes, "v2/routes"),
        (Collection::QuotaDefinitions, "v2/quota_definitions"),
        (Collection::SpaceQuotaDefinitions, "v2/space_quota_definitions"),
        (Collection::Buildpacks, "v2/buildpacks"),
        (Collection::Stacks, "v2/stacks"),
        (Collection::Services, "v2/services"),
        (Collection::ServicePlans, "v2/service_plans"),
        (Collection::ServiceInstances, "v2/service_instances"),
        (Collection::ServiceBrokers, "v2/service_brokers"),
        (Collection::ServiceBindings, "v2/service_bindings"),
        (Collection::ServiceKeys, "v2/service_keys"),
        (Collection::SecurityGroups, "v2/security_groups"),
        (Collection::ServicePlanVisibilities, "v2/service_plan_visibilities"),
        (Collection::Events, "v2/events"),
        (Collection::Users, "v2/users"),
    ];

    /// Role listings per organization, as `v2/organizations/{guid}/{role}`.
    pub const ORGANIZATION_ROLES: &'static [&'static str] =
        &["auditors", "billing_managers", "managers", "users"];

    /// Role listings per space, as `v2/spaces/{guid}/{role}`.
    pub const SPACE_ROLES: &'static [&'static str] = &["auditors", "developers", "managers"];

    /// The source that fetches this collection.
    pub fn source(self) -> SourceKind {
        match self {
            Self::IdentityUsers
            | Self::IdentityGroups
            | Self::IdentityClients
            | Self::IdentityZones
            | Self::IdentityProviders => SourceKind::Identity,
            Self::Components | Self::DeaInstances => SourceKind::Telemetry,
            Self::FirehoseComponents | Self::ContainerMetrics => SourceKind::Firehose,
            _ => SourceKind::ControlPlane,
        }
    }
}

// ── NaturalKey ───────────────────────────────────────────────────────

/// Identifier correlating one real-world entity across sources.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaturalKey {
    Guid(String),
    Name(String),
    Host(String),
    Instance {
        origin: String,
        index: String,
        ip: String,
    },
    Container {
        app_guid: String,
        index: u64,
    },
    /// A user holding `role` in the organization or space `scope`.
    Role {
        scope: String,
        role: String,
        user: String,
    },
    /// A security group bound to a space.
    GroupSpace {
        group: String,
        space: String,
    },
}

impl NaturalKey {
    /// Parse the `origin:index:ip` form used by firehose component paths.
    pub fn parse_instance(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        let origin = parts.next().filter(|s| !s.is_empty())?;
        let index = parts.next().filter(|s| !s.is_empty())?;
        let ip = parts.next().filter(|s| !s.is_empty())?;
        Some(Self::Instance {
            origin: origin.to_owned(),
            index: index.to_owned(),
            ip: ip.to_owned(),
        })
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guid(s) | Self::Name(s) | Self::Host(s) => f.write_str(s),
            Self::Instance { origin, index, ip } => write!(f, "{origin}:{index}:{ip}"),
            Self::Container { app_guid, index } => write!(f, "{app_guid}/{index}"),
            Self::Role { scope, role, user } => write!(f, "{scope}/{role}/{user}"),
            Self::GroupSpace { group, space } => write!(f, "{group}/{space}"),
        }
    }
}

// ── SourceRecord ─────────────────────────────────────────────────────

/// One raw record as fetched, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRecord {
    pub origin: SourceKind,
    pub collection: Collection,
    pub key: NaturalKey,
    pub fields: Map<String, Value>,
}

impl SourceRecord {
    pub fn new(collection: Collection, key: NaturalKey, fields: Map<String, Value>) -> Self {
        Self {
            origin: collection.source(),
            collection,
            key,
            fields,
        }
    }

    /// Raw field value, `None` when absent.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field as a string slice, `None` when absent or not a string.
    pub fn str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Field as an unsigned integer.
    pub fn u64(&self, field: &str) -> Option<u64> {
        self.fields.get(field).and_then(Value::as_u64)
    }

    /// Field cloned, or JSON `null` when absent.
    pub fn cell(&self, field: &str) -> Value {
        self.fields.get(field).cloned().unwrap_or(Value::Null)
    }
}

// ── SourceSnapshot ───────────────────────────────────────────────────

pub type RecordMap = BTreeMap<Collection, Vec<SourceRecord>>;

/// Every record one source returned in a single poll cycle.
///
/// A snapshot replaces its predecessor as a unit. A failed poll publishes
/// a snapshot that carries the previous records forward with
/// `connected = false`.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub kind: SourceKind,
    pub records: Arc<RecordMap>,
    /// Time of the last successful fetch.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Time of the last attempt, successful or not.
    pub last_attempt: Option<DateTime<Utc>>,
    pub connected: bool,
    pub last_error: Option<String>,
    /// Number of snapshots published for this source so far.
    pub generation: u64,
}

impl SourceSnapshot {
    /// Placeholder before the first poll completes.
    pub fn pending(kind: SourceKind) -> Self {
        Self {
            kind,
            records: Arc::new(RecordMap::new()),
            fetched_at: None,
            last_attempt: None,
            connected: false,
            last_error: None,
            generation: 0,
        }
    }

    /// Group a flat list of records by collection.
    pub fn group(records: Vec<SourceRecord>) -> RecordMap {
        let mut map = RecordMap::new();
        for record in records {
            map.entry(record.collection).or_default().push(record);
        }
        map
    }

    pub fn records(&self, collection: Collection) -> &[SourceRecord] {
        self.records.get(&collection).map_or(&[], Vec::as_slice)
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn contains(&self, collection: Collection, key: &NaturalKey) -> bool {
        self.records(collection).iter().any(|r| &r.key == key)
    }
}

// ── SourceSet ────────────────────────────────────────────────────────

/// The current snapshot of every configured source, published as one
/// immutable value. Builders read exactly one `SourceSet` per run.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    pub snapshots: BTreeMap<SourceKind, Arc<SourceSnapshot>>,
    /// Bumped on every publish; stamped onto the view models built from it.
    pub epoch: u64,
}

impl SourceSet {
    pub fn new(kinds: impl IntoIterator<Item = SourceKind>) -> Self {
        Self {
            snapshots: kinds
                .into_iter()
                .map(|k| (k, Arc::new(SourceSnapshot::pending(k))))
                .collect(),
            epoch: 0,
        }
    }

    pub fn get(&self, kind: SourceKind) -> Option<&SourceSnapshot> {
        self.snapshots.get(&kind).map(AsRef::as_ref)
    }

    /// Records of one collection, empty when the owning source is absent.
    pub fn records(&self, collection: Collection) -> &[SourceRecord] {
        self.get(collection.source())
            .map_or(&[], |snap| snap.records(collection))
    }

    /// Whether every configured source in `deps` is connected.
    /// Sources that are not configured do not count against the result.
    pub fn connected(&self, deps: &[SourceKind]) -> bool {
        deps.iter()
            .filter_map(|k| self.get(*k))
            .all(|snap| snap.connected)
    }

    /// New set with one snapshot replaced and the epoch bumped.
    pub fn with_snapshot(&self, snapshot: SourceSnapshot) -> Self {
        let mut snapshots = self.snapshots.clone();
        snapshots.insert(snapshot.kind, Arc::new(snapshot));
        Self {
            snapshots,
            epoch: self.epoch + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(collection: Collection, guid: &str) -> SourceRecord {
        let Value::Object(fields) = json!({ "guid": guid, "name": format!("n-{guid}") }) else {
            unreachable!()
        };
        SourceRecord::new(collection, NaturalKey::Guid(guid.into()), fields)
    }

    #[test]
    fn natural_keys_render_path_friendly() {
        let instance = NaturalKey::Instance {
            origin: "rep".into(),
            index: "2".into(),
            ip: "10.0.0.5".into(),
        };
        assert_eq!(instance.to_string(), "rep:2:10.0.0.5");
        assert_eq!(NaturalKey::parse_instance("rep:2:10.0.0.5"), Some(instance));
        assert_eq!(NaturalKey::parse_instance("rep:2"), None);

        let container = NaturalKey::Container {
            app_guid: "a1".into(),
            index: 3,
        };
        assert_eq!(container.to_string(), "a1/3");

        let role = NaturalKey::Role {
            scope: "o1".into(),
            role: "auditors".into(),
            user: "u1".into(),
        };
        assert_eq!(role.to_string(), "o1/auditors/u1");

        let binding = NaturalKey::GroupSpace {
            group: "sg1".into(),
            space: "s1".into(),
        };
        assert_eq!(binding.to_string(), "sg1/s1");
    }

    #[test]
    fn records_are_tagged_with_owning_source() {
        let r = record(Collection::IdentityUsers, "u1");
        assert_eq!(r.origin, SourceKind::Identity);
        assert_eq!(r.str("name"), Some("n-u1"));
        assert_eq!(r.cell("missing"), Value::Null);

        assert_eq!(Collection::IdentityZones.source(), SourceKind::Identity);
        assert_eq!(Collection::SpaceRoles.source(), SourceKind::ControlPlane);
    }

    #[test]
    fn connected_ignores_unconfigured_sources() {
        let set = SourceSet::new([SourceKind::ControlPlane]);
        let mut snap = SourceSnapshot::pending(SourceKind::ControlPlane);
        snap.connected = true;
        let set = set.with_snapshot(snap);

        assert_eq!(set.epoch, 1);
        assert!(set.connected(&[SourceKind::ControlPlane, SourceKind::Firehose]));
    }

    #[test]
    fn snapshot_groups_by_collection() {
        let grouped = SourceSnapshot::group(vec![
            record(Collection::Apps, "a1"),
            record(Collection::Spaces, "s1"),
            record(Collection::Apps, "a2"),
        ]);
        let mut snap = SourceSnapshot::pending(SourceKind::ControlPlane);
        snap.records = Arc::new(grouped);

        assert_eq!(snap.records(Collection::Apps).len(), 2);
        assert_eq!(snap.record_count(), 3);
        assert!(snap.contains(Collection::Spaces, &NaturalKey::Guid("s1".into())));
        assert!(snap.records(Collection::Routes).is_empty());
    }
}
