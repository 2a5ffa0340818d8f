// Telemetry source: one record per announced component, plus one record
// per application instance found in a DEA's instance registry.
//
// A component whose varz scrape failed is kept with state `OFFLINE` so the
// console still lists it. An operator can remove such a component; it stays
// hidden until it answers a scrape again, is announced under a different
// registration, or drops off the registry.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::debug;

use overseer_api::TelemetryClient;
use overseer_api::types::{ComponentRegistration, ComponentStatus};

use super::{SourceClient, fields, unreachable};
use crate::error::CoreError;
use crate::model::{Collection, NaturalKey, SourceKind, SourceRecord};

pub const STATE_RUNNING: &str = "RUNNING";
pub const STATE_OFFLINE: &str = "OFFLINE";

/// What a host was last announced as.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Announcement {
    component_type: String,
    index: u64,
    uuid: Option<String>,
}

impl Announcement {
    fn of(registration: &ComponentRegistration) -> Self {
        Self {
            component_type: registration.component_type.clone(),
            index: registration.index,
            uuid: registration.uuid.clone(),
        }
    }
}

pub struct TelemetrySource {
    client: TelemetryClient,
    /// Announcement per host from the last successful listing.
    announced: Mutex<HashMap<String, Announcement>>,
    /// Hosts removed by an operator, with the announcement they were removed under.
    removed: Mutex<HashMap<String, Announcement>>,
}

impl TelemetrySource {
    pub fn new(client: TelemetryClient) -> Self {
        Self {
            client,
            announced: Mutex::new(HashMap::new()),
            removed: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<SourceRecord>, CoreError> {
        let statuses = self
            .client
            .discover()
            .await
            .map_err(|e| unreachable(SourceKind::Telemetry, &e))?;
        Ok(self.collect(statuses))
    }

    fn collect(&self, statuses: Vec<ComponentStatus>) -> Vec<SourceRecord> {
        let mut removed = lock(&self.removed);
        let hosts: HashSet<&str> = statuses
            .iter()
            .map(|s| s.registration.host.as_str())
            .collect();
        removed.retain(|host, _| hosts.contains(host.as_str()));

        let mut announced = HashMap::with_capacity(statuses.len());
        let mut records = Vec::with_capacity(statuses.len());
        for status in statuses {
            let host = status.registration.host.clone();
            let announcement = Announcement::of(&status.registration);

            let still_removed = status.varz.is_err()
                && removed.get(&host).is_some_and(|prior| *prior == announcement);
            if still_removed {
                continue;
            }
            if removed.remove(&host).is_some() {
                debug!(host, "removed component is back");
            }

            announced.insert(host, announcement);
            records.extend(dea_instances(&status));
            records.push(component_record(status));
        }

        *lock(&self.announced) = announced;
        records
    }
}

impl SourceClient for TelemetrySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Telemetry
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<SourceRecord>, CoreError>> {
        Box::pin(self.fetch_all())
    }

    fn evict(&self, key: &NaturalKey) -> bool {
        let NaturalKey::Host(host) = key else {
            return false;
        };
        let Some(announcement) = lock(&self.announced).remove(host) else {
            return false;
        };
        lock(&self.removed).insert(host.clone(), announcement);
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn component_record(status: ComponentStatus) -> SourceRecord {
    let registration = status.registration;
    let (mut record, state, error) = match status.varz {
        Ok(varz) => (varz, STATE_RUNNING, Value::Null),
        Err(e) => (Map::new(), STATE_OFFLINE, Value::String(e)),
    };

    record.extend(fields([
        ("type", Value::String(registration.component_type)),
        ("index", Value::from(registration.index)),
        ("host", Value::String(registration.host.clone())),
        ("uri", Value::String(status.uri)),
        ("state", Value::String(state.to_owned())),
        ("error", error),
    ]));

    SourceRecord::new(
        Collection::Components,
        NaturalKey::Host(registration.host),
        record,
    )
}

/// Instances from `instance_registry: {app_guid: {instance_id: {...}}}`.
fn dea_instances(status: &ComponentStatus) -> Vec<SourceRecord> {
    let Ok(varz) = &status.varz else {
        return Vec::new();
    };
    let Some(Value::Object(registry)) = varz.get("instance_registry") else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for (app_guid, instances) in registry {
        let Value::Object(instances) = instances else {
            continue;
        };
        for (instance_id, instance) in instances {
            let Value::Object(instance) = instance else {
                continue;
            };
            let Some(index) = instance.get("instance_index").and_then(Value::as_u64) else {
                continue;
            };

            let mut record = instance.clone();
            record.extend(fields([
                ("application_id", Value::String(app_guid.clone())),
                ("instance_id", Value::String(instance_id.clone())),
                ("dea_host", Value::String(status.registration.host.clone())),
            ]));
            records.push(SourceRecord::new(
                Collection::DeaInstances,
                NaturalKey::Container {
                    app_guid: app_guid.clone(),
                    index,
                },
                record,
            ));
        }
    }
    records
}
