// ── Operation dispatcher ──
//
// Turns a mutating request into backing API calls. Targets are validated
// against the installed views only; nothing is fetched to validate. After
// every backing call succeeds the owning sources are re-polled before the
// dispatcher returns, so the caller's next read reflects the change.

use std::sync::Arc;

use futures_util::future::{BoxFuture, try_join_all};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, info};

use overseer_api::{ControlPlaneClient, IdentityClient, Method};

use crate::builder::columns;
use crate::engine::Aggregator;
use crate::error::CoreError;
use crate::model::{Collection, NaturalKey, ResourceType, SourceKind, ViewModel};

// ── Operation ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Verb {
    Get,
    Put,
    Post,
    Delete,
}

impl Verb {
    fn method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Put => Method::PUT,
            Self::Post => Method::POST,
            Self::Delete => Method::DELETE,
        }
    }
}

/// One inbound mutating request, already split into path segments.
#[derive(Debug, Clone)]
pub struct Operation {
    pub verb: Verb,
    /// First path segment, e.g. `organizations`.
    pub resource: String,
    /// Remaining path segments.
    pub segments: Vec<String>,
    /// Query flags (`recursive`, `purge`, `uri`), forwarded unchanged.
    pub query: Vec<(String, String)>,
    /// Raw request body, forwarded unchanged.
    pub body: Option<String>,
}

impl Operation {
    pub fn new(verb: Verb, resource: impl Into<String>, segments: &[&str]) -> Self {
        Self {
            verb,
            resource: resource.into(),
            segments: segments.iter().map(|s| (*s).to_owned()).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn flag(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

// ── Backend seam ─────────────────────────────────────────────────────

/// One request forwarded to a backing API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingCall {
    /// `ControlPlane` or `Identity`.
    pub target: SourceKind,
    pub verb: Verb,
    /// Path relative to the target's base URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Where mutations are sent.
pub trait MutationBackend: Send + Sync {
    fn call<'a>(&'a self, call: &'a BackingCall) -> BoxFuture<'a, Result<(), CoreError>>;
}

/// Forwards calls to the real control-plane and identity clients.
pub struct ApiBackend {
    control_plane: Option<Arc<ControlPlaneClient>>,
    identity: Option<Arc<IdentityClient>>,
}

impl ApiBackend {
    pub fn new(
        control_plane: Option<Arc<ControlPlaneClient>>,
        identity: Option<Arc<IdentityClient>>,
    ) -> Self {
        Self {
            control_plane,
            identity,
        }
    }
}

impl MutationBackend for ApiBackend {
    fn call<'a>(&'a self, call: &'a BackingCall) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            let method = call.verb.method();
            let body = call.body.as_deref();
            match call.target {
                SourceKind::ControlPlane => {
                    let client = self.control_plane.as_ref().ok_or_else(|| not_configured(call))?;
                    client.send(method, &call.path, &call.query, body).await?;
                }
                SourceKind::Identity => {
                    let client = self.identity.as_ref().ok_or_else(|| not_configured(call))?;
                    client.send(method, &call.path, &call.query, body).await?;
                }
                other => {
                    return Err(CoreError::Unsupported {
                        operation: format!("backing calls to {other}"),
                    });
                }
            }
            Ok(())
        })
    }
}

fn not_configured(call: &BackingCall) -> CoreError {
    CoreError::Config {
        message: format!("{} is not configured, cannot {} {}", call.target, call.verb, call.path),
    }
}

// ── Routing ──────────────────────────────────────────────────────────

/// A control-plane entity addressed as `/{resource}/{key}`.
struct Entity {
    resource: &'static str,
    view: ResourceType,
    path: &'static str,
    put: bool,
    delete: bool,
}

const ENTITIES: &[Entity] = &[
    Entity { resource: "applications", view: ResourceType::Applications, path: "v2/apps", put: true, delete: true },
    Entity { resource: "buildpacks", view: ResourceType::Buildpacks, path: "v2/buildpacks", put: true, delete: true },
    Entity { resource: "feature_flags", view: ResourceType::FeatureFlags, path: "v2/config/feature_flags", put: true, delete: false },
    Entity { resource: "organizations", view: ResourceType::Organizations, path: "v2/organizations", put: true, delete: true },
    Entity { resource: "spaces", view: ResourceType::Spaces, path: "v2/spaces", put: true, delete: true },
    Entity { resource: "quota_definitions", view: ResourceType::Quotas, path: "v2/quota_definitions", put: true, delete: true },
    Entity { resource: "space_quota_definitions", view: ResourceType::SpaceQuotas, path: "v2/space_quota_definitions", put: true, delete: true },
    Entity { resource: "routes", view: ResourceType::Routes, path: "v2/routes", put: false, delete: true },
    Entity { resource: "services", view: ResourceType::Services, path: "v2/services", put: false, delete: true },
    Entity { resource: "service_plans", view: ResourceType::ServicePlans, path: "v2/service_plans", put: true, delete: true },
    Entity { resource: "service_brokers", view: ResourceType::ServiceBrokers, path: "v2/service_brokers", put: true, delete: true },
    Entity { resource: "service_bindings", view: ResourceType::ServiceBindings, path: "v2/service_bindings", put: false, delete: true },
    Entity { resource: "service_keys", view: ResourceType::ServiceKeys, path: "v2/service_keys", put: false, delete: true },
    Entity { resource: "security_groups", view: ResourceType::SecurityGroups, path: "v2/security_groups", put: false, delete: true },
    Entity { resource: "service_plan_visibilities", view: ResourceType::ServicePlanVisibilities, path: "v2/service_plan_visibilities", put: false, delete: true },
];

/// A recognized mutation, before validation against the views.
enum Route<'a> {
    Update { entity: &'static Entity, key: &'a str },
    Delete { entity: &'static Entity, key: &'a str },
    CreateOrganization,
    Restage { guid: &'a str },
    DeleteInstance { guid: &'a str, index: &'a str },
    DeleteDomain { guid: &'a str },
    ServiceInstance { guid: &'a str, gateway: Option<&'a str> },
    SpaceQuotaSpace { quota: &'a str, space: &'a str },
    SecurityGroupSpace { group: &'a str, space: &'a str },
    RemoveRole { scope: &'static str, view: ResourceType, guid: &'a str, role: &'a str, user: &'a str },
    DeleteUser { id: &'a str },
    DeleteClient { id: &'a str },
    DeleteGroup { id: &'a str },
    EvictComponent,
    EvictFirehoseComponent,
}

fn route(op: &Operation) -> Option<Route<'_>> {
    let segments: Vec<&str> = op.segments.iter().map(String::as_str).collect();
    let entity = ENTITIES.iter().find(|e| e.resource == op.resource);

    let route = match (op.verb, op.resource.as_str(), segments.as_slice()) {
        (Verb::Post, "organizations", &[]) => Route::CreateOrganization,
        (Verb::Post, "applications", &[guid, "restage"]) => Route::Restage { guid },
        (Verb::Delete, "applications", &[guid, index]) => Route::DeleteInstance { guid, index },
        (Verb::Delete, "domains", &[guid]) => Route::DeleteDomain { guid },
        (Verb::Put | Verb::Delete, "service_instances", &[guid]) => Route::ServiceInstance {
            guid,
            gateway: None,
        },
        (Verb::Put | Verb::Delete, "service_instances", &[guid, gateway]) => Route::ServiceInstance {
            guid,
            gateway: Some(gateway),
        },
        (Verb::Put | Verb::Delete, "space_quota_definitions", &[quota, "spaces", space]) => {
            Route::SpaceQuotaSpace { quota, space }
        }
        (Verb::Delete, "security_groups", &[group, space]) => Route::SecurityGroupSpace { group, space },
        (Verb::Delete, "organizations", &[guid, role, user])
            if Collection::ORGANIZATION_ROLES.contains(&role) =>
        {
            Route::RemoveRole {
                scope: "organizations",
                view: ResourceType::OrganizationRoles,
                guid,
                role,
                user,
            }
        }
        (Verb::Delete, "spaces", &[guid, role, user]) if Collection::SPACE_ROLES.contains(&role) => {
            Route::RemoveRole {
                scope: "spaces",
                view: ResourceType::SpaceRoles,
                guid,
                role,
                user,
            }
        }
        (Verb::Delete, "users", &[id]) => Route::DeleteUser { id },
        (Verb::Delete, "clients", &[id]) => Route::DeleteClient { id },
        (Verb::Delete, "groups", &[id]) => Route::DeleteGroup { id },
        (Verb::Delete, "components", &[]) => Route::EvictComponent,
        (Verb::Delete, "doppler_components", &[]) => Route::EvictFirehoseComponent,
        (Verb::Put, _, &[key]) => Route::Update {
            entity: entity.filter(|e| e.put)?,
            key,
        },
        (Verb::Delete, _, &[key]) => Route::Delete {
            entity: entity.filter(|e| e.delete)?,
            key,
        },
        _ => return None,
    };
    Some(route)
}

/// What one mutation does once validated.
#[derive(Debug, Default)]
struct Plan {
    calls: Vec<BackingCall>,
    /// Records dropped locally after the calls succeed.
    evictions: Vec<(SourceKind, NaturalKey)>,
    /// Sources re-polled after the calls succeed.
    refresh: Vec<SourceKind>,
}

impl Plan {
    fn control_plane(op: &Operation, verb: Verb, path: String, body: Option<String>) -> Self {
        Self {
            calls: vec![BackingCall {
                target: SourceKind::ControlPlane,
                verb,
                path,
                query: op.query.clone(),
                body,
            }],
            evictions: Vec::new(),
            refresh: vec![SourceKind::ControlPlane],
        }
    }

    fn identity(path: String) -> Self {
        Self {
            calls: vec![BackingCall {
                target: SourceKind::Identity,
                verb: Verb::Delete,
                path,
                query: Vec::new(),
                body: None,
            }],
            evictions: Vec::new(),
            refresh: vec![SourceKind::Identity],
        }
    }

    fn evict(kind: SourceKind, key: NaturalKey) -> Self {
        Self {
            evictions: vec![(kind, key)],
            ..Self::default()
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Dispatcher {
    aggregator: Aggregator,
    backend: Arc<dyn MutationBackend>,
}

impl Dispatcher {
    pub fn new(aggregator: Aggregator, backend: Arc<dyn MutationBackend>) -> Self {
        Self {
            aggregator,
            backend,
        }
    }

    /// Whether `op` names a supported mutation. Says nothing about whether
    /// its target exists.
    pub fn recognizes(op: &Operation) -> bool {
        route(op).is_some()
    }

    /// Validate, forward, then refresh.
    ///
    /// Errors before the first backing call leave everything untouched.
    /// A backing failure is returned as-is with no refresh. A refresh
    /// failure after the calls succeeded is `RefreshAfterMutation`.
    pub async fn dispatch(&self, op: &Operation) -> Result<(), CoreError> {
        let route = route(op).ok_or_else(|| CoreError::Unsupported {
            operation: format!("{} /{}", op.verb, op.resource),
        })?;
        let plan = self.plan(op, &route)?;

        for call in &plan.calls {
            debug!(target_source = %call.target, verb = %call.verb, path = %call.path, "forwarding");
            self.backend.call(call).await?;
        }

        for (kind, key) in &plan.evictions {
            if self.aggregator.evict(*kind, key) {
                info!(source = %kind, %key, "evicted");
            }
        }

        let refresh = plan
            .refresh
            .iter()
            .copied()
            .filter(|k| self.aggregator.has_source(*k))
            .map(|kind| async move {
                self.aggregator
                    .poll(kind)
                    .await
                    .map_err(|e| CoreError::RefreshAfterMutation {
                        source_kind: kind,
                        reason: e.to_string(),
                    })
            });
        try_join_all(refresh).await?;
        Ok(())
    }

    fn plan(&self, op: &Operation, route: &Route<'_>) -> Result<Plan, CoreError> {
        let plan = match *route {
            Route::Update { entity, key } => {
                self.require(entity.view, key)?;
                let body = update_body(op)?;
                Plan::control_plane(op, Verb::Put, format!("{}/{key}", entity.path), Some(body))
            }
            Route::Delete { entity, key } => {
                self.require(entity.view, key)?;
                Plan::control_plane(op, Verb::Delete, format!("{}/{key}", entity.path), None)
            }
            Route::CreateOrganization => {
                let body = object_body(op)?.ok_or_else(|| malformed("body must be a JSON object"))?;
                if !body.get("name").is_some_and(Value::is_string) {
                    return Err(malformed("organization name is required"));
                }
                Plan::control_plane(op, Verb::Post, "v2/organizations".into(), op.body.clone())
            }
            Route::Restage { guid } => {
                self.require(ResourceType::Applications, guid)?;
                object_body(op)?;
                Plan::control_plane(op, Verb::Post, format!("v2/apps/{guid}/restage"), op.body.clone())
            }
            Route::DeleteInstance { guid, index } => {
                let parsed: u64 = index
                    .parse()
                    .map_err(|_| malformed(format!("instance index must be a number, got {index}")))?;
                self.require(ResourceType::Applications, guid)?;
                self.require_instance(guid, index)?;

                let key = NaturalKey::Container {
                    app_guid: guid.to_owned(),
                    index: parsed,
                };
                let mut plan = Plan::control_plane(
                    op,
                    Verb::Delete,
                    format!("v2/apps/{guid}/instances/{index}"),
                    None,
                );
                plan.evictions = vec![
                    (SourceKind::Telemetry, key.clone()),
                    (SourceKind::Firehose, key),
                ];
                plan
            }
            Route::DeleteDomain { guid } => {
                let view = self.require(ResourceType::Domains, guid)?;
                let shared = view
                    .row(guid)
                    .and_then(|row| row.get(columns::DOMAIN_SHARED))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let collection = if shared { "shared_domains" } else { "private_domains" };
                Plan::control_plane(op, Verb::Delete, format!("v2/{collection}/{guid}"), None)
            }
            Route::ServiceInstance { guid, gateway } => {
                self.require(ResourceType::ServiceInstances, guid)?;
                let collection = match gateway {
                    Some("false") => "user_provided_service_instances",
                    _ => "service_instances",
                };
                let path = format!("v2/{collection}/{guid}");
                match op.verb {
                    Verb::Put => Plan::control_plane(op, Verb::Put, path, Some(update_body(op)?)),
                    _ => Plan::control_plane(op, Verb::Delete, path, None),
                }
            }
            Route::SpaceQuotaSpace { quota, space } => {
                self.require(ResourceType::SpaceQuotas, quota)?;
                self.require(ResourceType::Spaces, space)?;
                let path = format!("v2/space_quota_definitions/{quota}/spaces/{space}");
                Plan::control_plane(op, op.verb, path, None)
            }
            Route::SecurityGroupSpace { group, space } => {
                self.require(ResourceType::SecurityGroupsSpaces, &format!("{group}/{space}"))?;
                let path = format!("v2/security_groups/{group}/spaces/{space}");
                Plan::control_plane(op, Verb::Delete, path, None)
            }
            Route::RemoveRole {
                scope,
                view,
                guid,
                role,
                user,
            } => {
                self.require(view, &format!("{guid}/{role}/{user}"))?;
                Plan::control_plane(op, Verb::Delete, format!("v2/{scope}/{guid}/{role}/{user}"), None)
            }
            Route::DeleteUser { id } => {
                let view = self.require(ResourceType::Users, id)?;
                let in_control_plane = view
                    .row(id)
                    .and_then(|row| row.get(columns::USER_IN_CONTROL_PLANE))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);

                // The control-plane user goes first, then the identity user.
                let identity = Plan::identity(format!("Users/{id}"));
                if in_control_plane {
                    let mut plan = Plan::control_plane(op, Verb::Delete, format!("v2/users/{id}"), None);
                    plan.calls.extend(identity.calls);
                    plan.refresh.extend(identity.refresh);
                    plan
                } else {
                    identity
                }
            }
            Route::DeleteClient { id } => {
                self.require(ResourceType::Clients, id)?;
                Plan::identity(format!("oauth/clients/{id}"))
            }
            Route::DeleteGroup { id } => {
                self.require(ResourceType::Groups, id)?;
                Plan::identity(format!("Groups/{id}"))
            }
            Route::EvictComponent => {
                let uri = op.flag("uri").ok_or_else(|| malformed("uri is required"))?;
                let sources = self.aggregator.sources_snapshot();
                let key = sources
                    .records(Collection::Components)
                    .iter()
                    .find(|r| r.str("uri") == Some(uri) || r.str("host") == Some(uri))
                    .map(|r| r.key.clone())
                    .ok_or_else(|| not_found("components", uri))?;
                Plan::evict(SourceKind::Telemetry, key)
            }
            Route::EvictFirehoseComponent => {
                let uri = op.flag("uri").ok_or_else(|| malformed("uri is required"))?;
                let key = NaturalKey::parse_instance(uri)
                    .ok_or_else(|| malformed(format!("expected origin:index:ip, got {uri}")))?;
                let present = self
                    .aggregator
                    .sources_snapshot()
                    .get(SourceKind::Firehose)
                    .is_some_and(|snap| snap.contains(Collection::FirehoseComponents, &key));
                if !present {
                    return Err(not_found("doppler_components", uri));
                }
                Plan::evict(SourceKind::Firehose, key)
            }
        };
        Ok(plan)
    }

    /// The installed view of `resource`, if it has a row keyed `key`.
    fn require(
        &self,
        resource: ResourceType,
        key: &str,
    ) -> Result<Arc<ViewModel>, CoreError> {
        let view = self.aggregator.view(resource);
        if view.contains(key) {
            Ok(view)
        } else {
            Err(not_found(resource.as_ref(), key))
        }
    }

    fn require_instance(&self, guid: &str, index: &str) -> Result<(), CoreError> {
        let prefix = format!("{guid}/{index}");
        let view = self.aggregator.view(ResourceType::ApplicationInstances);
        let found = view
            .entries
            .keys()
            .any(|k| k == &prefix || k.strip_prefix(&prefix).is_some_and(|rest| rest.starts_with('/')));
        if found {
            Ok(())
        } else {
            Err(not_found("application_instances", &prefix))
        }
    }
}

// ── Body validation ──────────────────────────────────────────────────

/// The body as a JSON object; `None` when absent or blank.
fn object_body(op: &Operation) -> Result<Option<Map<String, Value>>, CoreError> {
    let Some(raw) = op.body.as_deref().filter(|b| !b.trim().is_empty()) else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(malformed("body must be a JSON object")),
        Err(e) => Err(malformed(format!("body is not valid JSON: {e}"))),
    }
}

/// Raw body of an update, which must be a non-empty JSON object.
fn update_body(op: &Operation) -> Result<String, CoreError> {
    match (object_body(op)?, op.body.as_ref()) {
        (Some(map), Some(raw)) if !map.is_empty() => Ok(raw.clone()),
        _ => Err(malformed("update body must be a non-empty JSON object")),
    }
}

fn malformed(message: impl Into<String>) -> CoreError {
    CoreError::MalformedInput {
        message: message.into(),
    }
}

fn not_found(resource: &str, key: &str) -> CoreError {
    CoreError::NotFound {
        resource: resource.to_owned(),
        key: key.to_owned(),
    }
}
