// ── Built view models ──
//
// One `ViewModel` per resource type, built from a single `SourceSet`
// epoch. Rows and details live side by side in the same entry so a list
// read and a detail read of the same generation always agree.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use super::source::SourceKind;

// ── ResourceType ─────────────────────────────────────────────────────

/// A console view: one table plus a detail projection per row.
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
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceType {
    Applications,
    ApplicationInstances,
    Organizations,
    Spaces,
    Routes,
    Domains,
    Quotas,
    SpaceQuotas,
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
    SecurityGroupsSpaces,
    ServicePlanVisibilities,
    Events,
    OrganizationRoles,
    SpaceRoles,
    Users,
    Clients,
    Groups,
    IdentityZones,
    IdentityProviders,
    Components,
    Deas,
    Cells,
    Routers,
    HealthManagers,
    CloudControllers,
    Gateways,
}

impl ResourceType {
    /// Sources this view is joined from.
    pub fn dependencies(self) -> &'static [SourceKind] {
        const CP: &[SourceKind] = &[SourceKind::ControlPlane];
        const CP_LIVE: &[SourceKind] = &[
            SourceKind::ControlPlane,
            SourceKind::Telemetry,
            SourceKind::Firehose,
        ];
        const LIVE: &[SourceKind] = &[SourceKind::Telemetry, SourceKind::Firehose];

        match self {
            Self::Applications
            | Self::ApplicationInstances
            | Self::Organizations
            | Self::Spaces => CP_LIVE,
            Self::Users | Self::OrganizationRoles | Self::SpaceRoles => {
                &[SourceKind::Identity, SourceKind::ControlPlane]
            }
            Self::Clients | Self::Groups | Self::IdentityZones | Self::IdentityProviders => {
                &[SourceKind::Identity]
            }
            Self::Components | Self::Deas | Self::Routers | Self::HealthManagers => LIVE,
            Self::Cells => &[SourceKind::Firehose],
            Self::CloudControllers | Self::Gateways => &[SourceKind::Telemetry],
            _ => CP,
        }
    }

    pub fn depends_on(self, kind: SourceKind) -> bool {
        self.dependencies().contains(&kind)
    }

    /// Parse the `{resource}_view_model` path segment.
    pub fn from_view_segment(segment: &str) -> Option<Self> {
        segment.strip_suffix("_view_model")?.parse().ok()
    }
}

// ── ViewModel ────────────────────────────────────────────────────────

/// One joined entity: positional cells for the table plus its detail.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewEntry {
    /// Column 0 always carries the row key.
    pub cells: Vec<Value>,
    pub detail: Map<String, Value>,
}

/// The built view of one resource type.
#[derive(Debug, Clone)]
pub struct ViewModel {
    pub resource: ResourceType,
    /// Epoch of the `SourceSet` this model was built from.
    pub generation: u64,
    pub connected: bool,
    pub built_at: DateTime<Utc>,
    /// Row key → entry, in display order.
    pub entries: IndexMap<String, ViewEntry>,
}

impl ViewModel {
    /// Empty, disconnected model installed before the first build.
    pub fn empty(resource: ResourceType) -> Self {
        Self {
            resource,
            generation: 0,
            connected: false,
            built_at: DateTime::<Utc>::UNIX_EPOCH,
            entries: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn row(&self, key: &str) -> Option<&[Value]> {
        self.entries.get(key).map(|e| e.cells.as_slice())
    }

    pub fn detail(&self, key: &str) -> Option<&Map<String, Value>> {
        self.entries.get(key).map(|e| &e.detail)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Table shape served to the console.
    pub fn table(&self) -> ViewTable<'_> {
        ViewTable {
            records_total: self.len(),
            records_filtered: self.len(),
            items: TableItems {
                connected: self.connected,
                items: self.entries.values().map(|e| e.cells.as_slice()).collect(),
            },
        }
    }
}

/// `{recordsTotal, recordsFiltered, items: {connected, items}}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewTable<'a> {
    pub records_total: usize,
    pub records_filtered: usize,
    pub items: TableItems<'a>,
}

#[derive(Debug, Serialize)]
pub struct TableItems<'a> {
    pub connected: bool,
    pub items: Vec<&'a [Value]>,
}

// ── StatCounters ─────────────────────────────────────────────────────

/// Point-in-time rollup of the platform's size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatCounters {
    #[serde(default)]
    pub apps: u64,
    #[serde(default)]
    pub cells: u64,
    #[serde(default)]
    pub deas: u64,
    #[serde(default)]
    pub organizations: u64,
    #[serde(default)]
    pub running_instances: u64,
    #[serde(default)]
    pub spaces: u64,
    #[serde(default)]
    pub total_instances: u64,
    #[serde(default)]
    pub users: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: f64,
}

/// Current time as fractional epoch milliseconds.
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub fn epoch_millis(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64
}
