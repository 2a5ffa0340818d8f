// Wire types for the REST sources.
//
// Entity payloads are kept as raw JSON objects: the aggregation layer
// projects whichever fields a view needs, and unknown fields must survive
// into detail views untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Control plane (v2) ───────────────────────────────────────────────

/// One page of a control-plane v2 collection.
#[derive(Debug, Clone, Deserialize)]
pub struct CcPage {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub next_url: Option<String>,
    #[serde(default)]
    pub resources: Vec<CcResource>,
}

/// A `{metadata, entity}` resource from a v2 collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CcResource {
    pub metadata: CcMetadata,
    #[serde(default)]
    pub entity: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CcMetadata {
    pub guid: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl CcResource {
    /// Flatten metadata into the entity so every field sits at one level.
    pub fn into_fields(self) -> Map<String, Value> {
        let mut fields = self.entity;
        fields.insert("guid".into(), Value::String(self.metadata.guid));
        if let Some(created) = self.metadata.created_at {
            fields.insert("created_at".into(), Value::String(created));
        }
        fields.insert(
            "updated_at".into(),
            self.metadata.updated_at.map_or(Value::Null, Value::String),
        );
        fields
    }
}

// ── Identity (SCIM) ──────────────────────────────────────────────────

/// One page of a SCIM-style listing (`/Users`, `/Groups`, `/oauth/clients`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimPage {
    #[serde(default)]
    pub resources: Vec<Map<String, Value>>,
    #[serde(default)]
    pub start_index: u64,
    #[serde(default)]
    pub items_per_page: u64,
    #[serde(default)]
    pub total_results: u64,
}

// ── Telemetry registry ───────────────────────────────────────────────

/// A component announced on the telemetry bus.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentRegistration {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default)]
    pub index: u64,
    pub host: String,
    #[serde(default)]
    pub uuid: Option<String>,
    /// Basic-auth pair for the varz endpoint.
    #[serde(default)]
    pub credentials: Option<Vec<String>>,
}

impl ComponentRegistration {
    pub fn varz_uri(&self) -> String {
        format!("http://{}/varz", self.host)
    }
}

/// Result of scraping one registered component.
#[derive(Debug, Clone)]
pub struct ComponentStatus {
    pub registration: ComponentRegistration,
    pub uri: String,
    /// Parsed varz document, or the scrape error text.
    pub varz: Result<Map<String, Value>, String>,
}
