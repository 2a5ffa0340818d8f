// Service marketplace views: brokers, services, plans and the
// organizations a private plan is visible to, plus the instances,
// bindings and keys provisioned from them.

use serde_json::Value;

use super::{Entry, Lookup, count_by, count_of, detail, entry, target};
use crate::model::{Collection, SourceSet};

pub(super) fn services(sources: &SourceSet) -> Vec<Entry> {
    let brokers = Lookup::of(sources, Collection::ServiceBrokers);
    let plans = Lookup::of(sources, Collection::ServicePlans);
    let plan_counts = count_by(sources.records(Collection::ServicePlans), "service_guid");

    // Instances reference plans, not services.
    let mut instance_counts = std::collections::HashMap::<&str, u64>::new();
    for instance in sources.records(Collection::ServiceInstances) {
        if let Some(service) = plans
            .get(instance.str("service_plan_guid"))
            .and_then(|p| p.str("service_guid"))
        {
            *instance_counts.entry(service).or_insert(0) += 1;
        }
    }

    sources
        .records(Collection::Services)
        .iter()
        .filter_map(|service| {
            let guid = service.str("guid")?;
            let broker = brokers.get(service.str("service_broker_guid"));
            let cells = vec![
                service.cell("label"),
                service.cell("provider"),
                service.cell("version"),
                service.cell("created_at"),
                service.cell("active"),
                service.cell("bindable"),
                broker.map_or(Value::Null, |b| b.cell("name")),
                count_of(&plan_counts, guid),
                count_of(&instance_counts, guid),
                service.cell("updated_at"),
            ];
            let detail = detail([("service", Some(service)), ("service_broker", broker)]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

pub(super) fn service_plans(sources: &SourceSet) -> Vec<Entry> {
    let services = Lookup::of(sources, Collection::Services);
    let instance_counts = count_by(
        sources.records(Collection::ServiceInstances),
        "service_plan_guid",
    );

    sources
        .records(Collection::ServicePlans)
        .iter()
        .filter_map(|plan| {
            let guid = plan.str("guid")?;
            let service = services.get(plan.str("service_guid"));
            let cells = vec![
                plan.cell("name"),
                plan.cell("created_at"),
                plan.cell("updated_at"),
                plan.cell("unique_id"),
                plan.cell("free"),
                plan.cell("active"),
                plan.cell("public"),
                service.map_or(Value::Null, |s| s.cell("label")),
                count_of(&instance_counts, guid),
            ];
            let detail = detail([("service_plan", Some(plan)), ("service", service)]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

pub(super) fn service_instances(sources: &SourceSet) -> Vec<Entry> {
    let plans = Lookup::of(sources, Collection::ServicePlans);
    let services = Lookup::of(sources, Collection::Services);
    let spaces = Lookup::of(sources, Collection::Spaces);
    let orgs = Lookup::of(sources, Collection::Organizations);
    let binding_counts = count_by(
        sources.records(Collection::ServiceBindings),
        "service_instance_guid",
    );
    let key_counts = count_by(
        sources.records(Collection::ServiceKeys),
        "service_instance_guid",
    );

    sources
        .records(Collection::ServiceInstances)
        .iter()
        .filter_map(|instance| {
            let guid = instance.str("guid")?;
            let plan = plans.get(instance.str("service_plan_guid"));
            let service = plan.and_then(|p| services.get(p.str("service_guid")));
            let space = spaces.get(instance.str("space_guid"));
            let cells = vec![
                instance.cell("name"),
                instance.cell("created_at"),
                plan.map_or(Value::Null, |p| p.cell("name")),
                service.map_or(Value::Null, |s| s.cell("label")),
                count_of(&binding_counts, guid),
                count_of(&key_counts, guid),
                target(space, &orgs),
                instance.cell("updated_at"),
            ];
            let detail = detail([
                ("service_instance", Some(instance)),
                ("service_plan", plan),
                ("service", service),
                ("space", space),
            ]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

pub(super) fn service_brokers(sources: &SourceSet) -> Vec<Entry> {
    let service_counts = count_by(sources.records(Collection::Services), "service_broker_guid");

    sources
        .records(Collection::ServiceBrokers)
        .iter()
        .filter_map(|broker| {
            let guid = broker.str("guid")?;
            let cells = vec![
                broker.cell("name"),
                broker.cell("broker_url"),
                broker.cell("created_at"),
                count_of(&service_counts, guid),
                broker.cell("updated_at"),
            ];
            Some(entry(
                guid.to_owned(),
                cells,
                detail([("service_broker", Some(broker))]),
            ))
        })
        .collect()
}

pub(super) fn service_bindings(sources: &SourceSet) -> Vec<Entry> {
    let apps = Lookup::of(sources, Collection::Apps);
    let instances = Lookup::of(sources, Collection::ServiceInstances);
    let spaces = Lookup::of(sources, Collection::Spaces);
    let orgs = Lookup::of(sources, Collection::Organizations);

    sources
        .records(Collection::ServiceBindings)
        .iter()
        .filter_map(|binding| {
            let guid = binding.str("guid")?;
            let app = apps.get(binding.str("app_guid"));
            let instance = instances.get(binding.str("service_instance_guid"));
            let space = app.and_then(|a| spaces.get(a.str("space_guid")));
            let cells = vec![
                app.map_or(Value::Null, |a| a.cell("name")),
                instance.map_or(Value::Null, |i| i.cell("name")),
                binding.cell("created_at"),
                target(space, &orgs),
                binding.cell("updated_at"),
            ];
            let detail = detail([
                ("service_binding", Some(binding)),
                ("application", app),
                ("service_instance", instance),
            ]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

pub(super) fn service_keys(sources: &SourceSet) -> Vec<Entry> {
    let instances = Lookup::of(sources, Collection::ServiceInstances);

    sources
        .records(Collection::ServiceKeys)
        .iter()
        .filter_map(|key| {
            let guid = key.str("guid")?;
            let instance = instances.get(key.str("service_instance_guid"));
            let cells = vec![
                key.cell("name"),
                instance.map_or(Value::Null, |i| i.cell("name")),
                key.cell("created_at"),
                key.cell("updated_at"),
            ];
            let detail = detail([("service_key", Some(key)), ("service_instance", instance)]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}

pub(super) fn service_plan_visibilities(sources: &SourceSet) -> Vec<Entry> {
    let plans = Lookup::of(sources, Collection::ServicePlans);
    let services = Lookup::of(sources, Collection::Services);
    let orgs = Lookup::of(sources, Collection::Organizations);

    sources
        .records(Collection::ServicePlanVisibilities)
        .iter()
        .filter_map(|visibility| {
            let guid = visibility.str("guid")?;
            let plan = plans.get(visibility.str("service_plan_guid"));
            let service = plan.and_then(|p| services.get(p.str("service_guid")));
            let org = orgs.get(visibility.str("organization_guid"));
            let cells = vec![
                service.map_or(Value::Null, |s| s.cell("label")),
                plan.map_or(Value::Null, |p| p.cell("name")),
                org.map_or(Value::Null, |o| o.cell("name")),
                visibility.cell("created_at"),
                visibility.cell("updated_at"),
            ];
            let detail = detail([
                ("service_plan_visibility", Some(visibility)),
                ("service_plan", plan),
                ("service", service),
                ("organization", org),
            ]);
            Some(entry(guid.to_owned(), cells, detail))
        })
        .collect()
}
