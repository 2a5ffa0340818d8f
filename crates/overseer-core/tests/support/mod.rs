// Scripted sources and a recording backend shared by the integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value, json};

use overseer_core::{
    BackingCall, Collection, CoreError, MutationBackend, NaturalKey, SourceClient, SourceKind,
    SourceRecord, Verb,
};

// ── Records ─────────────────────────────────────────────────────────

pub fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// A control-plane record keyed by its `guid` field.
pub fn cp(collection: Collection, value: Value) -> SourceRecord {
    let fields = fields(value);
    let guid = fields["guid"].as_str().unwrap().to_owned();
    SourceRecord::new(collection, NaturalKey::Guid(guid), fields)
}

pub fn identity_user(id: &str, user_name: &str) -> SourceRecord {
    SourceRecord::new(
        Collection::IdentityUsers,
        NaturalKey::Guid(id.into()),
        fields(json!({ "id": id, "userName": user_name, "active": true, "groups": [] })),
    )
}

pub fn dea_instance(app_guid: &str, index: u64, state: &str) -> SourceRecord {
    SourceRecord::new(
        Collection::DeaInstances,
        NaturalKey::Container {
            app_guid: app_guid.into(),
            index,
        },
        fields(json!({
            "application_id": app_guid,
            "instance_index": index,
            "instance_id": format!("{app_guid}-{index}"),
            "state": state,
            "dea_host": "10.0.0.7:9022",
        })),
    )
}

pub fn varz_component(kind: &str, host: &str) -> SourceRecord {
    SourceRecord::new(
        Collection::Components,
        NaturalKey::Host(host.into()),
        fields(json!({
            "type": kind,
            "index": 0,
            "host": host,
            "uri": format!("http://{host}/varz"),
            "state": "RUNNING",
        })),
    )
}

pub fn firehose_component(origin: &str, index: &str, ip: &str) -> SourceRecord {
    SourceRecord::new(
        Collection::FirehoseComponents,
        NaturalKey::Instance {
            origin: origin.into(),
            index: index.into(),
            ip: ip.into(),
        },
        fields(json!({ "origin": origin, "index": index, "ip": ip })),
    )
}

/// A role assignment keyed `scope/role/user`.
pub fn role(collection: Collection, scope: &str, role: &str, user: &str) -> SourceRecord {
    let scope_field = if collection == Collection::OrganizationRoles {
        "organization_guid"
    } else {
        "space_guid"
    };
    SourceRecord::new(
        collection,
        NaturalKey::Role {
            scope: scope.into(),
            role: role.into(),
            user: user.into(),
        },
        fields(json!({ scope_field: scope, "role": role, "user_guid": user })),
    )
}

pub fn group_space(group: &str, space: &str) -> SourceRecord {
    SourceRecord::new(
        Collection::SecurityGroupSpaces,
        NaturalKey::GroupSpace {
            group: group.into(),
            space: space.into(),
        },
        fields(json!({ "security_group_guid": group, "space_guid": space })),
    )
}

/// One org with two spaces and two applications, one of them started.
pub fn platform() -> Vec<SourceRecord> {
    vec![
        cp(Collection::QuotaDefinitions, json!({ "guid": "q1", "name": "default" })),
        cp(
            Collection::SpaceQuotaDefinitions,
            json!({ "guid": "sq1", "name": "small", "organization_guid": "o1" }),
        ),
        cp(
            Collection::Organizations,
            json!({ "guid": "o1", "name": "acme", "status": "active", "quota_definition_guid": "q1" }),
        ),
        cp(
            Collection::Spaces,
            json!({ "guid": "s1", "name": "dev", "organization_guid": "o1" }),
        ),
        cp(
            Collection::Spaces,
            json!({ "guid": "s2", "name": "prod", "organization_guid": "o1" }),
        ),
        cp(
            Collection::Apps,
            json!({
                "guid": "a1", "name": "web", "state": "STARTED", "package_state": "STAGED",
                "instances": 2, "memory": 256, "space_guid": "s1"
            }),
        ),
        cp(
            Collection::Apps,
            json!({
                "guid": "a2", "name": "worker", "state": "STOPPED",
                "instances": 3, "memory": 128, "space_guid": "s2"
            }),
        ),
        cp(
            Collection::Domains,
            json!({ "guid": "d1", "name": "example.com", "shared": true }),
        ),
        cp(
            Collection::Domains,
            json!({ "guid": "d2", "name": "acme.internal", "shared": false, "owning_organization_guid": "o1" }),
        ),
        cp(
            Collection::Users,
            json!({ "guid": "u1", "admin": false }),
        ),
        cp(
            Collection::SecurityGroups,
            json!({ "guid": "sg1", "name": "public_networks" }),
        ),
        cp(
            Collection::ServicePlanVisibilities,
            json!({ "guid": "v1", "organization_guid": "o1" }),
        ),
        role(Collection::OrganizationRoles, "o1", "auditors", "u1"),
        role(Collection::SpaceRoles, "s1", "developers", "u1"),
        group_space("sg1", "s1"),
    ]
}

// ── ScriptedSource ──────────────────────────────────────────────────

/// A source whose records, failures and latency are set by the test.
pub struct ScriptedSource {
    kind: SourceKind,
    records: Mutex<Vec<SourceRecord>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    polls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(kind: SourceKind, records: Vec<SourceRecord>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            records: Mutex::new(records),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
            polls: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn push(&self, record: SourceRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn remove(&self, key: &NaturalKey) {
        self.records.lock().unwrap().retain(|r| &r.key != key);
    }

    /// Merge `patch` into the fields of the record keyed `key`.
    pub fn patch(&self, key: &NaturalKey, patch: Map<String, Value>) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| &r.key == key) {
            record.fields.extend(patch);
        }
    }
}

impl SourceClient for ScriptedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn fetch(&self) -> BoxFuture<'_, Result<Vec<SourceRecord>, CoreError>> {
        Box::pin(async move {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(CoreError::SourceUnreachable {
                    source_kind: self.kind,
                    reason: "connection refused".into(),
                });
            }
            Ok(self.records.lock().unwrap().clone())
        })
    }

    fn evict(&self, key: &NaturalKey) -> bool {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| &r.key != key);
        records.len() != before
    }
}

// ── RecordingBackend ────────────────────────────────────────────────

type Hook = Box<dyn Fn(&BackingCall) + Send + Sync>;

/// Records every forwarded call. Successful control-plane calls are
/// applied to `control_plane` the way the real API would apply them.
pub struct RecordingBackend {
    calls: Mutex<Vec<BackingCall>>,
    failure: Mutex<Option<(u16, String)>>,
    control_plane: Arc<ScriptedSource>,
    identity: Option<Arc<ScriptedSource>>,
    after_call: Mutex<Option<Hook>>,
}

impl RecordingBackend {
    pub fn new(control_plane: Arc<ScriptedSource>, identity: Option<Arc<ScriptedSource>>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            control_plane,
            identity,
            after_call: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> Vec<BackingCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_with(&self, status: u16, body: &str) {
        *self.failure.lock().unwrap() = Some((status, body.to_owned()));
    }

    pub fn after_call(&self, hook: impl Fn(&BackingCall) + Send + Sync + 'static) {
        *self.after_call.lock().unwrap() = Some(Box::new(hook));
    }

    fn apply(&self, call: &BackingCall) {
        let source = match call.target {
            SourceKind::Identity => match &self.identity {
                Some(identity) => identity,
                None => return,
            },
            _ => &self.control_plane,
        };
        let Some(key) = path_key(&call.path) else {
            return;
        };
        match call.verb {
            Verb::Delete => source.remove(&key),
            Verb::Put => {
                let patch = call
                    .body
                    .as_deref()
                    .and_then(|b| serde_json::from_str::<Value>(b).ok())
                    .map(fields)
                    .unwrap_or_default();
                source.patch(&key, patch);
            }
            Verb::Post if call.path == "v2/organizations" => {
                let body: Value = serde_json::from_str(call.body.as_deref().unwrap()).unwrap();
                let mut record = fields(body);
                record.insert("guid".into(), json!("o-new"));
                source.push(cp(Collection::Organizations, Value::Object(record)));
            }
            _ => {}
        }
    }
}

/// The record a backing path addresses: a relationship for role and
/// security-group bindings, else the entity named by the last segment.
fn path_key(path: &str) -> Option<NaturalKey> {
    let segments: Vec<&str> = path.split('/').collect();
    match segments.as_slice() {
        ["v2", "organizations" | "spaces", scope, role, user] => Some(NaturalKey::Role {
            scope: (*scope).to_owned(),
            role: (*role).to_owned(),
            user: (*user).to_owned(),
        }),
        ["v2", "security_groups", group, "spaces", space] => Some(NaturalKey::GroupSpace {
            group: (*group).to_owned(),
            space: (*space).to_owned(),
        }),
        [.., guid] => Some(NaturalKey::Guid((*guid).to_owned())),
        [] => None,
    }
}

impl MutationBackend for RecordingBackend {
    fn call<'a>(&'a self, call: &'a BackingCall) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(call.clone());
            if let Some((status, body)) = self.failure.lock().unwrap().clone() {
                return Err(CoreError::BackingOperationFailed { status, body });
            }
            self.apply(call);
            if let Some(hook) = self.after_call.lock().unwrap().as_ref() {
                hook(call);
            }
            Ok(())
        })
    }
}
