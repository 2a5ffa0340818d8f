// Control-plane views: applications and their instances, organizations,
// spaces, and the simple catalog tables.
//
// The control plane decides which applications exist. Running counts and
// resource usage come from telemetry and the firehose; an instance
// reported for an application the control plane no longer lists is
// dropped.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use super::{Entry, Lookup, count_by, count_of, detail, entry, target};
use crate::model::{Collection, NaturalKey, SourceKind, SourceRecord, SourceSet};

const STARTED: &str = "STARTED";
const RUNNING: &str = "RUNNING";

// ── Live instance join ───────────────────────────────────────────────

/// Everything known live about one `{app_guid, index}`.
#[derive(Default)]
struct LiveInstance<'a> {
    /// DEA registry entries; more than one while an instance is replaced.
    dea: Vec<&'a SourceRecord>,
    container: Option<&'a SourceRecord>,
}

impl LiveInstance<'_> {
    fn running(&self) -> bool {
        self.container.is_some() || self.dea.iter().any(|r| r.str("state") == Some(RUNNING))
    }

    fn memory_used(&self) -> u64 {
        self.container
            .and_then(|c| c.u64("memory_bytes"))
            .or_else(|| self.dea.iter().find_map(|r| r.u64("used_memory_in_bytes")))
            .unwrap_or(0)
    }

    fn cpu(&self) -> f64 {
        self.container
            .and_then(|c| c.value("cpu_percentage"))
            .or_else(|| self.dea.iter().find_map(|r| r.value("computed_pcpu")))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }
}

struct Live<'a> {
    /// Whether any live source is configured at all.
    available: bool,
    by_app: HashMap<&'a str, BTreeMap<u64, LiveInstance<'a>>>,
}

impl<'a> Live<'a> {
    fn of(sources: &'a SourceSet) -> Self {
        let mut by_app: HashMap<&'a str, BTreeMap<u64, LiveInstance<'a>>> = HashMap::new();

        for record in sources.records(Collection::DeaInstances) {
            if let NaturalKey::Container { app_guid, index } = &record.key {
                by_app
                    .entry(app_guid.as_str())
                    .or_default()
                    .entry(*index)
                    .or_default()
                    .dea
                    .push(record);
            }
        }
        for record in sources.records(Collection::ContainerMetrics) {
            if let NaturalKey::Container { app_guid, index } = &record.key {
                by_app
                    .entry(app_guid.as_str())
                    .or_default()
                    .entry(*index)
                    .or_default()
                    .container = Some(record);
            }
        }

        Self {
            available: sources.get(SourceKind::Telemetry).is_some()
                || sources.get(SourceKind::Firehose).is_some(),
            by_app,
        }
    }

    fn instances(&self, app: &str) -> impl Iterator<Item = (u64, &LiveInstance<'a>)> {
        self.by_app
            .get(app)
            .into_iter()
            .flat_map(|m| m.iter().map(|(i, inst)| (*i, inst)))
    }

    fn running(&self, app: &str) -> Option<u64> {
        self.available
            .then(|| self.instances(app).filter(|(_, i)| i.running()).count())
            .map(|n| u64::try_from(n).unwrap_or(u64::MAX))
    }
}

/// Reserved and live usage of a group of applications.
#[derive(Default)]
struct Usage {
    apps: u64,
    total_instances: u64,
    running_instances: Option<u64>,
    memory: u64,
}

impl Usage {
    fn add(&mut self, app: &SourceRecord, live: &Live<'_>) {
        self.apps += 1;
        if app.str("state") == Some(STARTED) {
            let instances = app.u64("instances").unwrap_or(0);
            self.total_instances += instances;
            self.memory += app.u64("memory").unwrap_or(0).saturating_mul(instances);
        }
        if let Some(running) = app.str("guid").and_then(|guid| live.running(guid)) {
            *self.running_instances.get_or_insert(0) += running;
        }
    }

    fn running_cell(&self, live: &Live<'_>) -> Value {
        match self.running_instances {
            Some(n) => Value::from(n),
            None if live.available => Value::from(0),
            None => Value::Null,
        }
    }
}

fn usage_by<'a>(
    apps: &'a [SourceRecord],
    live: &Live<'_>,
    group: impl Fn(&'a SourceRecord) -> Option<&'a str>,
) -> HashMap<&'a str, Usage> {
    let mut usage: HashMap<&str, Usage> = HashMap::new();
    for app in apps {
        if let Some(key) = group(app) {
            usage.entry(key).or_default().add(app, live);
        }
    }
    usage
}

// ── Applications ─────────────────────────────────────────────────────

pub(super) fn applications(sources: &SourceSet) -> Vec<Entry> {
    let spaces = Lookup::of(sources, Collection::Spaces);
    let orgs = Lookup::of(sources, Collection::Organizations);
    let live = Live::of(sources);

    sources
        .records(Collection::Apps)
        .iter()
        .filter_map(|app| {
            let guid = app.str("guid")?;
            let space = spaces.get(app.str("space_guid"));
            let org = space.and_then(|s| orgs.get(s.str("organization_guid")));

            let (memory_used, cpu, instances) = live.instances(guid).fold(
                (0u64, 0.0f64, Vec::new()),
                |(mem, cpu, mut list), (_, inst)| {
                    list.push(Value::Object(merged_instance(inst.dea.first().copied(), inst.container)));
                    (mem + inst.memory_used(), cpu + inst.cpu(), list)
                },
            );
            let buildpack = app
                .value("buildpack")
                .filter(|v| !v.is_null())
                .or_else(|| app.value("detected_buildpack"))
                .cloned()
                .unwrap_or(Value::Null);

            let cells = vec![
                app.cell("name"),
                app.cell("created_at"),
                app.cell("state"),
                app.cell("package_state"),
                app.cell("instances"),
                live.running(guid).map_or(Value::Null, Value::from),
                app.cell("memory"),
                app.cell("disk_quota"),
                buildpack,
                space.map_or(Value::Null, |s| s.cell("name")),
                org.map_or(Value::Null, |o| o.cell("name")),
                target(space, &orgs),
                if live.available { Value::from(memory_used) } else { Value::Null },
                if live.available { Value::from(cpu) } else { Value::Null },
            ];

            let mut detail = detail([
                ("application", Some(app)),
                ("space", space),
                ("organization", org),
            ]);
            detail.insert("instances".into(), Value::Array(instances));
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

fn merged_instance(dea: Option<&SourceRecord>, container: Option<&SourceRecord>) -> Map<String, Value> {
    let mut merged = dea.map(|r| r.fields.clone()).unwrap_or_default();
    if let Some(container) = container {
        merged.extend(container.fields.clone());
    }
    merged
}

pub(super) fn application_instances(sources: &SourceSet) -> Vec<Entry> {
    let apps = Lookup::of(sources, Collection::Apps);
    let spaces = Lookup::of(sources, Collection::Spaces);
    let orgs = Lookup::of(sources, Collection::Organizations);
    let live = Live::of(sources);

    let mut entries = Vec::new();
    for (&app_guid, instances) in &live.by_app {
        let Some(app) = apps.get(Some(app_guid)) else {
            continue;
        };
        let space = spaces.get(app.str("space_guid"));
        let org = space.and_then(|s| orgs.get(s.str("organization_guid")));

        for (&index, inst) in instances {
            let rows: Vec<Option<&SourceRecord>> = if inst.dea.is_empty() {
                vec![None]
            } else {
                inst.dea.iter().copied().map(Some).collect()
            };

            for dea in rows {
                let instance_id = dea.and_then(|r| r.str("instance_id"));
                let key = match instance_id {
                    Some(id) => format!("{app_guid}/{index}/{id}"),
                    None => format!("{app_guid}/{index}"),
                };
                let container = inst.container;
                let pick = |fh: &str, varz: &str| {
                    container
                        .and_then(|c| c.value(fh))
                        .or_else(|| dea.and_then(|d| d.value(varz)))
                        .cloned()
                        .unwrap_or(Value::Null)
                };
                let state = dea
                    .map(|d| d.cell("state"))
                    .unwrap_or_else(|| Value::String(RUNNING.into()));
                let host = dea
                    .and_then(|d| d.value("dea_host"))
                    .or_else(|| container.and_then(|c| c.value("reporter_ip")))
                    .cloned()
                    .unwrap_or(Value::Null);

                let cells = vec![
                    app.cell("name"),
                    Value::String(app_guid.to_owned()),
                    Value::from(index),
                    instance_id.map_or(Value::Null, |id| Value::String(id.to_owned())),
                    state,
                    pick("cpu_percentage", "computed_pcpu"),
                    pick("memory_bytes", "used_memory_in_bytes"),
                    pick("disk_bytes", "used_disk_in_bytes"),
                    pick("memory_bytes_quota", "mem_quota"),
                    pick("disk_bytes_quota", "disk_quota"),
                    host,
                    target(space, &orgs),
                ];

                let mut detail = detail([
                    ("application", Some(app)),
                    ("space", space),
                    ("organization", org),
                ]);
                detail.insert(
                    "instance".into(),
                    Value::Object(merged_instance(dea, container)),
                );
                entries.push(entry(key, cells, detail));
            }
        }
    }
    entries
}

// ── Organizations and spaces ─────────────────────────────────────────

pub(super) fn organizations(sources: &SourceSet) -> Vec<Entry> {
    let quotas = Lookup::of(sources, Collection::QuotaDefinitions);
    let spaces = Lookup::of(sources, Collection::Spaces);
    let live = Live::of(sources);

    let space_counts = count_by(sources.records(Collection::Spaces), "organization_guid");
    let route_counts = {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for route in sources.records(Collection::Routes) {
            if let Some(org) = spaces
                .get(route.str("space_guid"))
                .and_then(|s| s.str("organization_guid"))
            {
                *counts.entry(org).or_insert(0) += 1;
            }
        }
        counts
    };
    let usage = usage_by(sources.records(Collection::Apps), &live, |app| {
        spaces
            .get(app.str("space_guid"))
            .and_then(|s| s.str("organization_guid"))
    });
    let empty = Usage::default();

    sources
        .records(Collection::Organizations)
        .iter()
        .filter_map(|org| {
            let guid = org.str("guid")?;
            let quota = quotas.get(org.str("quota_definition_guid"));
            let u = usage.get(guid).unwrap_or(&empty);

            let cells = vec![
                org.cell("name"),
                org.cell("created_at"),
                org.cell("status"),
                count_of(&space_counts, guid),
                Value::from(u.apps),
                Value::from(u.total_instances),
                u.running_cell(&live),
                Value::from(u.memory),
                count_of(&route_counts, guid),
                quota.map_or(Value::Null, |q| q.cell("name")),
                org.cell("updated_at"),
            ];
            let detail = detail([("organization", Some(org)), ("quota_definition", quota)]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

pub(super) fn spaces(sources: &SourceSet) -> Vec<Entry> {
    let orgs = Lookup::of(sources, Collection::Organizations);
    let space_quotas = Lookup::of(sources, Collection::SpaceQuotaDefinitions);
    let live = Live::of(sources);

    let route_counts = count_by(sources.records(Collection::Routes), "space_guid");
    let usage = usage_by(sources.records(Collection::Apps), &live, |app| {
        app.str("space_guid")
    });
    let empty = Usage::default();

    sources
        .records(Collection::Spaces)
        .iter()
        .filter_map(|space| {
            let guid = space.str("guid")?;
            let org = orgs.get(space.str("organization_guid"));
            let quota = space_quotas.get(space.str("space_quota_definition_guid"));
            let u = usage.get(guid).unwrap_or(&empty);

            let cells = vec![
                space.cell("name"),
                space.cell("created_at"),
                org.map_or(Value::Null, |o| o.cell("name")),
                target(Some(space), &orgs),
                Value::from(u.apps),
                Value::from(u.total_instances),
                u.running_cell(&live),
                Value::from(u.memory),
                quota.map_or(Value::Null, |q| q.cell("name")),
                count_of(&route_counts, guid),
                space.cell("updated_at"),
            ];
            let detail = detail([
                ("space", Some(space)),
                ("organization", org),
                ("space_quota_definition", quota),
            ]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

// ── Routing ──────────────────────────────────────────────────────────

pub(super) fn routes(sources: &SourceSet) -> Vec<Entry> {
    let domains = Lookup::of(sources, Collection::Domains);
    let spaces = Lookup::of(sources, Collection::Spaces);
    let orgs = Lookup::of(sources, Collection::Organizations);

    sources
        .records(Collection::Routes)
        .iter()
        .filter_map(|route| {
            let guid = route.str("guid")?;
            let domain = domains.get(route.str("domain_guid"));
            let space = spaces.get(route.str("space_guid"));
            let host = route.str("host").unwrap_or_default();
            let path = route.str("path").unwrap_or_default();

            let uri = domain.and_then(|d| d.str("name")).map_or(Value::Null, |name| {
                let fqdn = if host.is_empty() {
                    name.to_owned()
                } else {
                    format!("{host}.{name}")
                };
                Value::String(format!("{fqdn}{path}"))
            });

            let cells = vec![
                uri,
                route.cell("host"),
                domain.map_or(Value::Null, |d| d.cell("name")),
                route.cell("path"),
                route.cell("created_at"),
                target(space, &orgs),
                route.cell("updated_at"),
            ];
            let detail = detail([("route", Some(route)), ("domain", domain), ("space", space)]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

pub(super) fn domains(sources: &SourceSet) -> Vec<Entry> {
    let orgs = Lookup::of(sources, Collection::Organizations);
    let route_counts = count_by(sources.records(Collection::Routes), "domain_guid");

    sources
        .records(Collection::Domains)
        .iter()
        .filter_map(|domain| {
            let guid = domain.str("guid")?;
            let owner = orgs.get(domain.str("owning_organization_guid"));

            let cells = vec![
                domain.cell("name"),
                domain.cell("created_at"),
                domain.cell("shared"),
                owner.map_or(Value::Null, |o| o.cell("name")),
                count_of(&route_counts, guid),
                domain.cell("updated_at"),
            ];
            let detail = detail([("domain", Some(domain)), ("owning_organization", owner)]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

// ── Quotas ───────────────────────────────────────────────────────────

pub(super) fn quotas(sources: &SourceSet) -> Vec<Entry> {
    let org_counts = count_by(sources.records(Collection::Organizations), "quota_definition_guid");

    sources
        .records(Collection::QuotaDefinitions)
        .iter()
        .filter_map(|quota| {
            let guid = quota.str("guid")?;
            let cells = vec![
                quota.cell("name"),
                quota.cell("created_at"),
                quota.cell("total_services"),
                quota.cell("total_routes"),
                quota.cell("memory_limit"),
                quota.cell("instance_memory_limit"),
                quota.cell("non_basic_services_allowed"),
                count_of(&org_counts, guid),
                quota.cell("updated_at"),
            ];
            let detail = detail([("quota_definition", Some(quota))]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

pub(super) fn space_quotas(sources: &SourceSet) -> Vec<Entry> {
    let orgs = Lookup::of(sources, Collection::Organizations);
    let space_counts = count_by(sources.records(Collection::Spaces), "space_quota_definition_guid");

    sources
        .records(Collection::SpaceQuotaDefinitions)
        .iter()
        .filter_map(|quota| {
            let guid = quota.str("guid")?;
            let org = orgs.get(quota.str("organization_guid"));
            let cells = vec![
                quota.cell("name"),
                quota.cell("created_at"),
                org.map_or(Value::Null, |o| o.cell("name")),
                quota.cell("total_services"),
                quota.cell("total_routes"),
                quota.cell("memory_limit"),
                quota.cell("instance_memory_limit"),
                quota.cell("non_basic_services_allowed"),
                count_of(&space_counts, guid),
                quota.cell("updated_at"),
            ];
            let detail = detail([("space_quota_definition", Some(quota)), ("organization", org)]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

// ── Catalog tables ───────────────────────────────────────────────────

pub(super) fn buildpacks(sources: &SourceSet) -> Vec<Entry> {
    sources
        .records(Collection::Buildpacks)
        .iter()
        .filter_map(|bp| {
            let guid = bp.str("guid")?;
            let cells = vec![
                bp.cell("name"),
                bp.cell("created_at"),
                bp.cell("updated_at"),
                bp.cell("position"),
                bp.cell("filename"),
                bp.cell("enabled"),
                bp.cell("locked"),
                bp.cell("stack"),
            ];
            Some(entry(guid.to_owned(), cells, detail([("buildpack", Some(bp))])))
        })
        .collect()
}

pub(super) fn feature_flags(sources: &SourceSet) -> Vec<Entry> {
    sources
        .records(Collection::FeatureFlags)
        .iter()
        .filter_map(|flag| {
            let name = flag.str("name")?;
            let cells = vec![
                flag.cell("name"),
                flag.cell("overridden"),
                flag.cell("default_value"),
                flag.cell("error_message"),
                flag.cell("enabled"),
            ];
            Some(entry(name.to_owned(), cells, detail([("feature_flag", Some(flag))])))
        })
        .collect()
}

pub(super) fn stacks(sources: &SourceSet) -> Vec<Entry> {
    let app_counts = count_by(sources.records(Collection::Apps), "stack_guid");

    sources
        .records(Collection::Stacks)
        .iter()
        .filter_map(|stack| {
            let guid = stack.str("guid")?;
            let cells = vec![
                stack.cell("name"),
                stack.cell("description"),
                stack.cell("created_at"),
                stack.cell("updated_at"),
                count_of(&app_counts, guid),
            ];
            Some(entry(guid.to_owned(), cells, detail([("stack", Some(stack))])))
        })
        .collect()
}

pub(super) fn security_groups(sources: &SourceSet) -> Vec<Entry> {
    sources
        .records(Collection::SecurityGroups)
        .iter()
        .filter_map(|group| {
            let guid = group.str("guid")?;
            let rules = group
                .value("rules")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            let cells = vec![
                group.cell("name"),
                group.cell("created_at"),
                group.cell("running_default"),
                group.cell("staging_default"),
                Value::from(rules),
                group.cell("updated_at"),
            ];
            Some(entry(
                guid.to_owned(),
                cells,
                detail([("security_group", Some(group))]),
            ))
        })
        .collect()
}

// ── Audit events ─────────────────────────────────────────────────────

pub(super) fn events(sources: &SourceSet) -> Vec<Entry> {
    let spaces = Lookup::of(sources, Collection::Spaces);
    let orgs = Lookup::of(sources, Collection::Organizations);

    sources
        .records(Collection::Events)
        .iter()
        .filter_map(|event| {
            let guid = event.str("guid")?;
            let space = spaces.get(event.str("space_guid"));
            let org = orgs
                .get(event.str("organization_guid"))
                .or_else(|| space.and_then(|s| orgs.get(s.str("organization_guid"))));
            let cells = vec![
                event.cell("timestamp"),
                event.cell("type"),
                event.cell("actee_type"),
                event.cell("actee_name"),
                event.cell("actor_type"),
                event.cell("actor_name"),
                match space {
                    Some(_) => target(space, &orgs),
                    None => org.map_or(Value::Null, |o| o.cell("name")),
                },
            ];
            let detail = detail([("event", Some(event)), ("space", space), ("organization", org)]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::super::fixtures::{cp, obj, platform, set, snapshot};
    use super::super::{build, columns};
    use crate::model::{Collection, NaturalKey, ResourceType, SourceKind, SourceRecord};

    fn container(app: &str, index: u64, memory: u64) -> SourceRecord {
        SourceRecord::new(
            Collection::ContainerMetrics,
            NaturalKey::Container {
                app_guid: app.into(),
                index,
            },
            obj(json!({
                "application_id": app, "instance_index": index,
                "cpu_percentage": 1.5, "memory_bytes": memory, "reporter_ip": "10.0.0.5"
            })),
        )
    }

    #[test]
    fn applications_join_space_and_org() {
        let sources = set(vec![snapshot(SourceKind::ControlPlane, platform(), true)]);
        let view = build(ResourceType::Applications, &sources);

        assert_eq!(view.len(), 3);
        let web = view.row("a1").unwrap();
        assert_eq!(web[0], json!("a1"));
        assert_eq!(web[columns::APP_NAME], json!("web"));
        assert_eq!(web[columns::APP_STATE], json!("STARTED"));
        assert_eq!(web[9], json!("ruby"));
        assert_eq!(web[12], json!("acme/dev"));
        // No live source configured: running count is unknown, not zero.
        assert_eq!(web[columns::APP_RUNNING_INSTANCES], json!(null));
    }

    #[test]
    fn unresolved_references_render_null() {
        let sources = set(vec![snapshot(SourceKind::ControlPlane, platform(), true)]);
        let view = build(ResourceType::Applications, &sources);

        let orphan = view.row("a3").unwrap();
        assert_eq!(orphan[10], json!(null));
        assert_eq!(orphan[11], json!(null));
        assert_eq!(orphan[12], json!(null));
        assert_eq!(view.detail("a3").unwrap()["space"], json!(null));
    }

    #[test]
    fn live_counts_come_from_firehose() {
        let sources = set(vec![
            snapshot(SourceKind::ControlPlane, platform(), true),
            snapshot(
                SourceKind::Firehose,
                vec![container("a1", 0, 100), container("a1", 1, 50)],
                true,
            ),
        ]);

        let apps = build(ResourceType::Applications, &sources);
        let web = apps.row("a1").unwrap();
        assert_eq!(web[columns::APP_RUNNING_INSTANCES], json!(2));
        assert_eq!(web[13], json!(150));
        assert_eq!(apps.row("a2").unwrap()[columns::APP_RUNNING_INSTANCES], json!(0));

        let orgs = build(ResourceType::Organizations, &sources);
        let acme = orgs.row("o1").unwrap();
        // apps, total instances (started only), running
        assert_eq!(acme[5], json!(2));
        assert_eq!(acme[6], json!(3));
        assert_eq!(acme[7], json!(2));
    }

    #[test]
    fn instances_of_unknown_apps_are_dropped() {
        let sources = set(vec![
            snapshot(SourceKind::ControlPlane, platform(), true),
            snapshot(
                SourceKind::Firehose,
                vec![container("a1", 0, 100), container("deleted-app", 0, 100)],
                true,
            ),
        ]);

        let view = build(ResourceType::ApplicationInstances, &sources);
        assert_eq!(view.len(), 1);
        let row = view.row("a1/0").unwrap();
        assert_eq!(row[1], json!("web"));
        assert_eq!(row[5], json!("RUNNING"));
        assert_eq!(row[11], json!("10.0.0.5"));
    }

    #[test]
    fn dea_instances_key_by_instance_id() {
        let dea = SourceRecord::new(
            Collection::DeaInstances,
            NaturalKey::Container {
                app_guid: "a1".into(),
                index: 0,
            },
            obj(json!({
                "instance_index": 0, "instance_id": "i-9", "state": "CRASHED",
                "dea_host": "10.0.0.7:9022", "computed_pcpu": 0.2
            })),
        );
        let sources = set(vec![
            snapshot(SourceKind::ControlPlane, platform(), true),
            snapshot(SourceKind::Telemetry, vec![dea], true),
        ]);

        let view = build(ResourceType::ApplicationInstances, &sources);
        let row = view.row("a1/0/i-9").unwrap();
        assert_eq!(row[5], json!("CRASHED"));
        assert_eq!(row[6], json!(0.2));

        let apps = build(ResourceType::Applications, &sources);
        assert_eq!(apps.row("a1").unwrap()[columns::APP_RUNNING_INSTANCES], json!(0));
    }

    #[test]
    fn organization_and_space_quota_columns() {
        let sources = set(vec![snapshot(SourceKind::ControlPlane, platform(), true)]);

        let orgs = build(ResourceType::Organizations, &sources);
        let acme = orgs.row("o1").unwrap();
        assert_eq!(acme[1], json!("acme"));
        assert_eq!(acme[3], json!("active"));
        assert_eq!(acme[4], json!(2));
        assert_eq!(acme[9], json!(1));
        assert_eq!(acme[10], json!("default"));

        let spaces = build(ResourceType::Spaces, &sources);
        assert_eq!(spaces.row("s1").unwrap()[9], json!("small"));
        assert_eq!(spaces.row("s2").unwrap()[9], json!(null));
    }

    #[test]
    fn routes_render_uri() {
        let sources = set(vec![snapshot(SourceKind::ControlPlane, platform(), true)]);
        let routes = build(ResourceType::Routes, &sources);
        assert_eq!(routes.row("r1").unwrap()[1], json!("www.example.com"));

        let domains = build(ResourceType::Domains, &sources);
        let d1 = domains.row("d1").unwrap();
        assert_eq!(d1[columns::DOMAIN_SHARED], json!(true));
        assert_eq!(d1[5], json!(1));
    }

    #[test]
    fn events_resolve_their_space_or_organization() {
        let mut records = platform();
        records.extend([
            cp(Collection::Events, json!({
                "guid": "e1", "type": "audit.app.update", "timestamp": "2026-02-01T10:00:00Z",
                "actee_type": "app", "actee_name": "web", "actor_type": "user", "actor_name": "admin",
                "space_guid": "s1", "organization_guid": ""
            })),
            cp(Collection::Events, json!({
                "guid": "e2", "type": "audit.organization.update", "actee_type": "organization",
                "actee_name": "acme", "space_guid": "", "organization_guid": "o1"
            })),
        ]);
        let sources = set(vec![snapshot(SourceKind::ControlPlane, records, true)]);

        let events = build(ResourceType::Events, &sources);
        let e1 = events.row("e1").unwrap();
        assert_eq!(e1[2], json!("audit.app.update"));
        assert_eq!(e1[7], json!("acme/dev"));
        assert_eq!(events.detail("e1").unwrap()["organization"]["guid"], json!("o1"));

        let e2 = events.row("e2").unwrap();
        assert_eq!(e2[7], json!("acme"));
        assert_eq!(events.detail("e2").unwrap()["space"], serde_json::Value::Null);
    }
}
