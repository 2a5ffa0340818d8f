// Platform component views.
//
// A component is known either from the telemetry registry (keyed by its
// host) or from the firehose (keyed by `origin:index:ip`, or `ip:index`
// on role-specific views). Each view selects components by varz type
// and firehose origin and appends its own metric columns.

use serde_json::Value;

use super::{Entry, count_by, count_of, entry};
use crate::model::{Collection, SourceKind, SourceRecord, SourceSet};
use crate::source::STATE_RUNNING;

const PROVISIONER_SUFFIX: &str = "-Provisioner";

#[derive(Clone, Copy)]
enum FirehoseKey {
    /// `origin:index:ip`
    Full,
    /// `ip:index`
    IpIndex,
}

/// How one view picks its components.
struct Select {
    varz_type: fn(&str) -> bool,
    origin: fn(&str) -> bool,
    firehose_key: FirehoseKey,
    varz_key: fn(&SourceRecord) -> Option<String>,
    /// `(varz field, firehose metric)` pairs appended as columns. An empty
    /// name renders `null` for that source.
    metrics: &'static [(&'static str, &'static str)],
}

/// One selected component, whichever source reported it.
struct Component<'a> {
    key: String,
    source: SourceKind,
    record: &'a SourceRecord,
}

impl Component<'_> {
    fn cells(&self) -> Vec<Value> {
        let r = self.record;
        match self.source {
            SourceKind::Firehose => vec![
                r.cell("origin"),
                r.cell("index"),
                Value::String(STATE_RUNNING.into()),
                r.cell("ip"),
                Value::String(self.source.to_string()),
            ],
            _ => vec![
                r.cell("type"),
                r.cell("index"),
                r.cell("state"),
                r.cell("host"),
                Value::String(self.source.to_string()),
            ],
        }
    }

    fn metric(&self, pair: (&str, &str)) -> Value {
        let field = match self.source {
            SourceKind::Firehose => pair.1,
            _ => pair.0,
        };
        self.record.cell(field)
    }

    fn detail(&self) -> serde_json::Map<String, Value> {
        let mut detail = serde_json::Map::new();
        detail.insert("component".into(), Value::Object(self.record.fields.clone()));
        detail.insert("source".into(), Value::String(self.source.to_string()));
        detail
    }
}

fn host_key(record: &SourceRecord) -> Option<String> {
    record.str("host").map(str::to_owned)
}

fn select<'a>(sources: &'a SourceSet, selector: &Select) -> Vec<Component<'a>> {
    let varz = sources
        .records(Collection::Components)
        .iter()
        .filter(|r| r.str("type").is_some_and(selector.varz_type))
        .filter_map(|r| {
            Some(Component {
                key: (selector.varz_key)(r)?,
                source: SourceKind::Telemetry,
                record: r,
            })
        });

    let firehose = sources
        .records(Collection::FirehoseComponents)
        .iter()
        .filter(|r| r.str("origin").is_some_and(selector.origin))
        .filter_map(|r| {
            let key = match selector.firehose_key {
                FirehoseKey::Full => r.key.to_string(),
                FirehoseKey::IpIndex => format!("{}:{}", r.str("ip")?, r.str("index")?),
            };
            Some(Component {
                key,
                source: SourceKind::Firehose,
                record: r,
            })
        });

    varz.chain(firehose).collect()
}

fn live_entries(
    sources: &SourceSet,
    selector: &Select,
    extra: impl Fn(&Component<'_>) -> Vec<Value>,
) -> Vec<Entry> {
    select(sources, selector)
        .into_iter()
        .map(|c| {
            let mut cells = c.cells();
            cells.extend(selector.metrics.iter().map(|&pair| c.metric(pair)));
            cells.extend(extra(&c));
            entry(c.key.clone(), cells, c.detail())
        })
        .collect()
}

// ── Views ────────────────────────────────────────────────────────────

pub(super) fn components(sources: &SourceSet) -> Vec<Entry> {
    let selector = Select {
        varz_type: |_| true,
        origin: |_| true,
        firehose_key: FirehoseKey::Full,
        varz_key: host_key,
        metrics: &[("uri", ""), ("", "deployment"), ("", "job"), ("error", "")],
    };
    live_entries(sources, &selector, |_| Vec::new())
}

pub(super) fn deas(sources: &SourceSet) -> Vec<Entry> {
    let selector = Select {
        varz_type: |t| t == "DEA",
        origin: |o| o == "DEA",
        firehose_key: FirehoseKey::IpIndex,
        varz_key: host_key,
        metrics: &[
            ("stacks", "stacks"),
            ("cpu", "numCPUS"),
            ("mem", "memoryStats.numBytesAllocated"),
            ("available_memory_ratio", "available_memory_ratio"),
            ("available_disk_ratio", "available_disk_ratio"),
        ],
    };
    let by_host = count_by(sources.records(Collection::DeaInstances), "dea_host");
    let by_ip = count_by(sources.records(Collection::ContainerMetrics), "reporter_ip");

    live_entries(sources, &selector, |c| {
        let count = match c.source {
            SourceKind::Firehose => c.record.str("ip").map(|ip| count_of(&by_ip, ip)),
            _ => c.record.str("host").map(|host| count_of(&by_host, host)),
        };
        vec![count.unwrap_or(Value::Null)]
    })
}

pub(super) fn cells(sources: &SourceSet) -> Vec<Entry> {
    let selector = Select {
        varz_type: |_| false,
        origin: |o| o == "rep",
        firehose_key: FirehoseKey::IpIndex,
        varz_key: host_key,
        metrics: &[
            ("", "deployment"),
            ("", "job"),
            ("", "CapacityTotalMemory"),
            ("", "CapacityRemainingMemory"),
            ("", "CapacityTotalDisk"),
            ("", "CapacityRemainingDisk"),
            ("", "CapacityTotalContainers"),
            ("", "CapacityRemainingContainers"),
            ("", "ContainerCount"),
        ],
    };
    let by_ip = count_by(sources.records(Collection::ContainerMetrics), "reporter_ip");

    live_entries(sources, &selector, |c| {
        vec![
            c.record
                .str("ip")
                .map_or(Value::Null, |ip| count_of(&by_ip, ip)),
        ]
    })
}

pub(super) fn routers(sources: &SourceSet) -> Vec<Entry> {
    let selector = Select {
        varz_type: |t| t == "Router",
        origin: |o| o == "gorouter",
        firehose_key: FirehoseKey::IpIndex,
        varz_key: host_key,
        metrics: &[
            ("requests", "total_requests"),
            ("responses_2xx", "responses.2xx"),
            ("responses_5xx", "responses.5xx"),
            ("cpu", "numCPUS"),
            ("mem", "memoryStats.numBytesAllocated"),
        ],
    };
    live_entries(sources, &selector, |_| Vec::new())
}

pub(super) fn health_managers(sources: &SourceSet) -> Vec<Entry> {
    let selector = Select {
        varz_type: |t| t == "HealthManager",
        origin: |o| matches!(o, "analyzer" | "hm9000"),
        firehose_key: FirehoseKey::IpIndex,
        varz_key: host_key,
        metrics: &[("cpu", "numCPUS"), ("mem", "memoryStats.numBytesAllocated")],
    };
    live_entries(sources, &selector, |_| Vec::new())
}

pub(super) fn cloud_controllers(sources: &SourceSet) -> Vec<Entry> {
    let selector = Select {
        varz_type: |t| t == "CloudController",
        origin: |_| false,
        firehose_key: FirehoseKey::IpIndex,
        varz_key: host_key,
        metrics: &[("cpu", ""), ("mem", ""), ("uptime", "")],
    };
    live_entries(sources, &selector, |_| Vec::new())
}

pub(super) fn gateways(sources: &SourceSet) -> Vec<Entry> {
    let selector = Select {
        varz_type: |t| t.ends_with(PROVISIONER_SUFFIX),
        origin: |_| false,
        firehose_key: FirehoseKey::IpIndex,
        varz_key: |r| {
            r.str("type")
                .and_then(|t| t.strip_suffix(PROVISIONER_SUFFIX))
                .map(str::to_owned)
        },
        metrics: &[("cpu", ""), ("mem", "")],
    };
    live_entries(sources, &selector, |c| {
        let nodes = match c.record.value("nodes") {
            Some(Value::Object(nodes)) => nodes.len(),
            Some(Value::Array(nodes)) => nodes.len(),
            _ => 0,
        };
        vec![Value::from(nodes)]
    })
}
