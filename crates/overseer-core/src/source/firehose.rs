// Firehose source: drains the folded stream state into records.
//
// Component metrics are flattened into the record next to the identity
// fields so builders can read e.g. `numCPUS` directly.

use std::time::Duration;

use chrono::SecondsFormat;
use futures_util::future::BoxFuture;
use serde_json::Value;

use overseer_api::FirehoseHandle;
use overseer_api::firehose::{ComponentKey, ComponentState, ContainerKey, ContainerState};

use super::{SourceClient, fields, unreachable};
use crate::error::CoreError;
use crate::model::{Collection, NaturalKey, SourceKind, SourceRecord};

pub struct FirehoseSource {
    handle: FirehoseHandle,
    stale_after: Duration,
}

impl FirehoseSource {
    pub fn new(handle: FirehoseHandle, stale_after: Duration) -> Self {
        Self {
            handle,
            stale_after,
        }
    }

    fn drain(&self) -> Result<Vec<SourceRecord>, CoreError> {
        let snapshot = self
            .handle
            .snapshot(self.stale_after)
            .map_err(|e| unreachable(SourceKind::Firehose, &e))?;

        let mut records = Vec::with_capacity(snapshot.components.len() + snapshot.containers.len());
        records.extend(snapshot.components.into_iter().map(component_record));
        records.extend(snapshot.containers.into_iter().map(container_record));
        Ok(records)
    }
}

impl SourceClient for FirehoseSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Firehose
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<SourceRecord>, CoreError>> {
        Box::pin(async move { self.drain() })
    }

    fn evict(&self, key: &NaturalKey) -> bool {
        match key {
            NaturalKey::Instance { origin, index, ip } => {
                self.handle.evict_component(&ComponentKey {
                    origin: origin.clone(),
                    index: index.clone(),
                    ip: ip.clone(),
                })
            }
            NaturalKey::Container { app_guid, index } => {
                self.handle.evict_container(&ContainerKey {
                    app_guid: app_guid.clone(),
                    instance_index: *index,
                })
            }
            _ => false,
        }
    }
}

fn component_record(state: ComponentState) -> SourceRecord {
    let ComponentKey { origin, index, ip } = state.key;
    let mut record = state.metrics;
    record.extend(fields([
        ("origin", Value::String(origin.clone())),
        ("index", Value::String(index.clone())),
        ("ip", Value::String(ip.clone())),
        ("deployment", state.deployment.map_or(Value::Null, Value::String)),
        ("job", state.job.map_or(Value::Null, Value::String)),
        (
            "received_at",
            Value::String(state.received_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ),
    ]));

    SourceRecord::new(
        Collection::FirehoseComponents,
        NaturalKey::Instance { origin, index, ip },
        record,
    )
}

fn container_record(state: ContainerState) -> SourceRecord {
    let ContainerKey {
        app_guid,
        instance_index,
    } = state.key;
    let record = fields([
        ("application_id", Value::String(app_guid.clone())),
        ("instance_index", Value::from(instance_index)),
        ("cpu_percentage", Value::from(state.cpu_percentage)),
        ("memory_bytes", Value::from(state.memory_bytes)),
        ("disk_bytes", Value::from(state.disk_bytes)),
        ("memory_bytes_quota", Value::from(state.memory_bytes_quota)),
        ("disk_bytes_quota", Value::from(state.disk_bytes_quota)),
        ("reporter_origin", Value::String(state.reporter.origin)),
        ("reporter_index", Value::String(state.reporter.index)),
        ("reporter_ip", Value::String(state.reporter.ip)),
        (
            "received_at",
            Value::String(state.received_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ),
    ]);

    SourceRecord::new(
        Collection::ContainerMetrics,
        NaturalKey::Container {
            app_guid,
            index: instance_index,
        },
        record,
    )
}
