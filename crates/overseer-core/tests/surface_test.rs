#![allow(clippy::unwrap_used)]
// Integration tests for `AdminSurface` routing and `Dispatcher` mutations
// against scripted sources and a recording backend.

mod support;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::Value;

use overseer_core::{
    AdminSurface, Aggregator, AuditLogger, BackingCall, Dispatcher, EngineConfig, MemorySink,
    Request, ResourceType, Response, SourceClient, SourceKind, Verb,
};

use support::{
    RecordingBackend, ScriptedSource, dea_instance, firehose_component, identity_user, platform,
    varz_component,
};

// ── Helpers ─────────────────────────────────────────────────────────

const ACTOR: &str = "admin";

struct Harness {
    cp: Arc<ScriptedSource>,
    identity: Arc<ScriptedSource>,
    telemetry: Arc<ScriptedSource>,
    firehose: Arc<ScriptedSource>,
    backend: Arc<RecordingBackend>,
    audit: Arc<MemorySink>,
    aggregator: Aggregator,
    surface: AdminSurface,
}

impl Harness {
    async fn start() -> Self {
        let cp = ScriptedSource::new(SourceKind::ControlPlane, platform());
        let identity = ScriptedSource::new(SourceKind::Identity, vec![identity_user("u1", "jdoe")]);
        let telemetry = ScriptedSource::new(
            SourceKind::Telemetry,
            vec![
                varz_component("DEA", "10.0.0.7:9022"),
                dea_instance("a1", 0, "RUNNING"),
                dea_instance("a1", 1, "RUNNING"),
            ],
        );
        let firehose = ScriptedSource::new(
            SourceKind::Firehose,
            vec![firehose_component("gorouter", "0", "10.0.0.9")],
        );

        let sources: Vec<Arc<dyn SourceClient>> = vec![
            cp.clone(),
            identity.clone(),
            telemetry.clone(),
            firehose.clone(),
        ];
        let aggregator = Aggregator::new(&EngineConfig::default(), sources);
        aggregator.start().await;

        let backend = RecordingBackend::new(cp.clone(), Some(identity.clone()));
        let dispatcher = Dispatcher::new(aggregator.clone(), backend.clone());
        let audit = Arc::new(MemorySink::default());
        let surface = AdminSurface::new(
            aggregator.clone(),
            dispatcher,
            Arc::new(AuditLogger::new(vec![audit.clone()])),
        );

        Self {
            cp,
            identity,
            telemetry,
            firehose,
            backend,
            audit,
            aggregator,
            surface,
        }
    }

    async fn send(&self, request: Request) -> Response {
        self.surface.handle(ACTOR, &request).await
    }

    async fn get_json(&self, path: &str) -> Value {
        let response = self.send(Request::new(Verb::Get, path)).await;
        assert_eq!(response.status, 200, "GET {path}: {}", response.body);
        serde_json::from_str(&response.body).unwrap()
    }

    fn call_paths(&self) -> Vec<(SourceKind, Verb, String)> {
        self.backend
            .calls()
            .into_iter()
            .map(|BackingCall { target, verb, path, .. }| (target, verb, path))
            .collect()
    }
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_table_read_has_console_shape() {
    let h = Harness::start().await;

    let table = h.get_json("/organizations_view_model").await;
    assert_eq!(table["recordsTotal"], 1);
    assert_eq!(table["recordsFiltered"], 1);
    assert_eq!(table["items"]["connected"], true);
    assert_eq!(table["items"]["items"][0][0], "o1");
    assert_eq!(table["items"]["items"][0][1], "acme");
}

#[tokio::test]
async fn test_detail_read_and_missing_key() {
    let h = Harness::start().await;

    let detail = h.get_json("/applications_view_model/a1").await;
    assert_eq!(detail["application"]["name"], "web");
    assert_eq!(detail["space"]["name"], "dev");

    let instance = h.get_json("/application_instances_view_model/a1/0/a1-0").await;
    assert_eq!(instance["instance"]["state"], "RUNNING");

    let missing = h.send(Request::new(Verb::Get, "/applications_view_model/zzz")).await;
    assert_eq!(missing.status, 404);
    assert_eq!(missing.body, "Page Not Found");
}

#[tokio::test]
async fn test_current_statistics_endpoint() {
    let h = Harness::start().await;

    let stats = h.get_json("/current_statistics").await;
    assert_eq!(stats["apps"], 2);
    assert_eq!(stats["deas"], 1);
    assert_eq!(stats["users"], 1);
    assert_eq!(stats["total_instances"], 2);
    assert_eq!(stats["running_instances"], 2);
}

#[tokio::test]
async fn test_unknown_paths_are_not_found_and_not_audited() {
    let h = Harness::start().await;

    for request in [
        Request::new(Verb::Get, "/nonsense_view_model"),
        Request::new(Verb::Get, "/"),
        Request::new(Verb::Put, "/widgets/w1").with_body(r#"{"name":"x"}"#),
        Request::new(Verb::Delete, "/feature_flags/diego_docker"),
        Request::new(Verb::Post, "/spaces").with_body(r#"{"name":"x"}"#),
    ] {
        let response = h.send(request).await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body, "Page Not Found");
    }
    assert!(h.audit.lines().is_empty());
    assert!(h.backend.calls().is_empty());
}

// ── Mutations ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_rename_is_visible_on_the_next_read() {
    let h = Harness::start().await;
    let polls = h.cp.polls();

    let response = h
        .send(Request::new(Verb::Put, "/organizations/o1").with_body(r#"{"name":"renamed"}"#))
        .await;
    assert_eq!(response.status, 204);
    assert_eq!(h.cp.polls(), polls + 1);

    let calls = h.backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].path, "v2/organizations/o1");
    assert_eq!(calls[0].body.as_deref(), Some(r#"{"name":"renamed"}"#));

    let detail = h.get_json("/organizations_view_model/o1").await;
    assert_eq!(detail["organization"]["name"], "renamed");
}

#[tokio::test]
async fn test_delete_twice_reports_not_found_the_second_time() {
    let h = Harness::start().await;

    let first = h.send(Request::new(Verb::Delete, "/spaces/s2")).await;
    assert_eq!(first.status, 204);
    assert!(!h.aggregator.view(ResourceType::Spaces).contains("s2"));

    let second = h.send(Request::new(Verb::Delete, "/spaces/s2")).await;
    assert_eq!(second.status, 404);
    assert_eq!(h.backend.calls().len(), 1);
}

#[tokio::test]
async fn test_query_flags_are_forwarded() {
    let h = Harness::start().await;

    let response = h
        .send(
            Request::new(Verb::Delete, "/organizations/o1")
                .with_query("recursive", "true"),
        )
        .await;
    assert_eq!(response.status, 204);

    let calls = h.backend.calls();
    assert_eq!(calls[0].query, vec![("recursive".to_owned(), "true".to_owned())]);
}

#[tokio::test]
async fn test_malformed_bodies_never_reach_the_backend() {
    let h = Harness::start().await;

    for body in ["[1]", "{}", "not json"] {
        let response = h
            .send(Request::new(Verb::Put, "/organizations/o1").with_body(body))
            .await;
        assert_eq!(response.status, 400, "body {body}");
    }

    let response = h
        .send(Request::new(Verb::Post, "/organizations").with_body(r#"{"quota":"q1"}"#))
        .await;
    assert_eq!(response.status, 400);

    let response = h
        .send(Request::new(Verb::Delete, "/applications/a1/first"))
        .await;
    assert_eq!(response.status, 400);

    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_create_organization() {
    let h = Harness::start().await;

    let response = h
        .send(Request::new(Verb::Post, "/organizations").with_body(r#"{"name":"newco"}"#))
        .await;
    assert_eq!(response.status, 204);
    assert_eq!(
        h.call_paths(),
        vec![(SourceKind::ControlPlane, Verb::Post, "v2/organizations".to_owned())]
    );
    assert!(h.aggregator.view(ResourceType::Organizations).contains("o-new"));
}

#[tokio::test]
async fn test_backing_failure_is_forwarded_without_refresh() {
    let h = Harness::start().await;
    let polls = h.cp.polls();
    h.backend.fail_with(422, r#"{"code":30002,"description":"name taken"}"#);

    let response = h
        .send(Request::new(Verb::Put, "/spaces/s1").with_body(r#"{"name":"prod"}"#))
        .await;
    assert_eq!(response.status, 422);
    assert_eq!(response.body, r#"{"code":30002,"description":"name taken"}"#);
    assert_eq!(h.cp.polls(), polls);
}

#[tokio::test]
async fn test_refresh_failure_after_mutation_is_unavailable() {
    let h = Harness::start().await;
    let cp = h.cp.clone();
    h.backend.after_call(move |_| cp.set_failing(true));

    let response = h.send(Request::new(Verb::Delete, "/routes/missing")).await;
    assert_eq!(response.status, 404);

    let response = h.send(Request::new(Verb::Delete, "/spaces/s1")).await;
    assert_eq!(response.status, 503);
    assert_eq!(h.backend.calls().len(), 1);
    assert!(!h.aggregator.view(ResourceType::Spaces).connected);
}

#[tokio::test]
async fn test_domain_delete_picks_shared_or_private_collection() {
    let h = Harness::start().await;

    assert_eq!(h.send(Request::new(Verb::Delete, "/domains/d1")).await.status, 204);
    assert_eq!(h.send(Request::new(Verb::Delete, "/domains/d2")).await.status, 204);

    let paths: Vec<String> = h.call_paths().into_iter().map(|(_, _, p)| p).collect();
    assert_eq!(paths, vec!["v2/shared_domains/d1", "v2/private_domains/d2"]);
}

#[tokio::test]
async fn test_user_delete_removes_platform_user_then_identity_user() {
    let h = Harness::start().await;
    let identity_polls = h.identity.polls();

    let response = h.send(Request::new(Verb::Delete, "/users/u1")).await;
    assert_eq!(response.status, 204);
    assert_eq!(
        h.call_paths(),
        vec![
            (SourceKind::ControlPlane, Verb::Delete, "v2/users/u1".to_owned()),
            (SourceKind::Identity, Verb::Delete, "Users/u1".to_owned()),
        ]
    );
    assert_eq!(h.identity.polls(), identity_polls + 1);
    assert!(h.aggregator.view(ResourceType::Users).is_empty());
}

#[tokio::test]
async fn test_role_removal_requires_a_known_role() {
    let h = Harness::start().await;

    let response = h
        .send(Request::new(Verb::Delete, "/spaces/s1/developers/u1"))
        .await;
    assert_eq!(response.status, 204);
    assert_eq!(h.backend.calls()[0].path, "v2/spaces/s1/developers/u1");
    assert!(h.aggregator.view(ResourceType::SpaceRoles).is_empty());
    let users = h.aggregator.view(ResourceType::Users);
    assert_eq!(users.detail("u1").unwrap()["control_plane_user"]["guid"], "u1");

    // A real role name the user does not hold.
    let response = h
        .send(Request::new(Verb::Delete, "/spaces/s1/managers/u1"))
        .await;
    assert_eq!(response.status, 404);

    let response = h
        .send(Request::new(Verb::Delete, "/spaces/s1/billing_managers/u1"))
        .await;
    assert_eq!(response.status, 404);
    assert_eq!(h.backend.calls().len(), 1);

    let response = h
        .send(Request::new(Verb::Delete, "/organizations/o1/auditors/u1"))
        .await;
    assert_eq!(response.status, 204);
    assert_eq!(h.backend.calls()[1].path, "v2/organizations/o1/auditors/u1");
    assert!(h.aggregator.view(ResourceType::OrganizationRoles).is_empty());
}

#[tokio::test]
async fn test_security_group_unbinding_requires_a_binding() {
    let h = Harness::start().await;

    let response = h.send(Request::new(Verb::Delete, "/security_groups/sg1/s2")).await;
    assert_eq!(response.status, 404);
    assert!(h.backend.calls().is_empty());

    let response = h.send(Request::new(Verb::Delete, "/security_groups/sg1/s1")).await;
    assert_eq!(response.status, 204);
    assert_eq!(
        h.call_paths(),
        vec![(
            SourceKind::ControlPlane,
            Verb::Delete,
            "v2/security_groups/sg1/spaces/s1".to_owned()
        )]
    );
    assert!(h.aggregator.view(ResourceType::SecurityGroupsSpaces).is_empty());
    assert_eq!(h.aggregator.view(ResourceType::SecurityGroups).len(), 1);
}

#[tokio::test]
async fn test_plan_visibility_delete() {
    let h = Harness::start().await;

    let response = h.send(Request::new(Verb::Delete, "/service_plan_visibilities/v1")).await;
    assert_eq!(response.status, 204);
    assert_eq!(h.backend.calls()[0].path, "v2/service_plan_visibilities/v1");
    assert!(h.aggregator.view(ResourceType::ServicePlanVisibilities).is_empty());

    let response = h.send(Request::new(Verb::Put, "/service_plan_visibilities/v1").with_body("{}")).await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_instance_delete_evicts_live_records() {
    let h = Harness::start().await;
    let telemetry_polls = h.telemetry.polls();
    assert!(
        h.aggregator
            .view(ResourceType::ApplicationInstances)
            .contains("a1/1/a1-1")
    );

    let response = h.send(Request::new(Verb::Delete, "/applications/a1/1")).await;
    assert_eq!(response.status, 204);
    assert_eq!(h.backend.calls()[0].path, "v2/apps/a1/instances/1");

    let instances = h.aggregator.view(ResourceType::ApplicationInstances);
    assert!(instances.contains("a1/0/a1-0"));
    assert!(!instances.contains("a1/1/a1-1"));
    assert_eq!(h.telemetry.polls(), telemetry_polls);

    let missing = h.send(Request::new(Verb::Delete, "/applications/a1/7")).await;
    assert_eq!(missing.status, 404);
}

#[tokio::test]
async fn test_component_removal_is_local_only() {
    let h = Harness::start().await;
    let firehose_polls = h.firehose.polls();

    let response = h
        .send(
            Request::new(Verb::Delete, "/doppler_components")
                .with_query("uri", "gorouter:0:10.0.0.9"),
        )
        .await;
    assert_eq!(response.status, 204);
    assert!(h.backend.calls().is_empty());
    assert_eq!(h.firehose.polls(), firehose_polls);
    assert!(h.aggregator.view(ResourceType::Routers).is_empty());

    let response = h
        .send(Request::new(Verb::Delete, "/components").with_query("uri", "http://10.0.0.7:9022/varz"))
        .await;
    assert_eq!(response.status, 204);
    assert!(h.aggregator.view(ResourceType::Deas).is_empty());

    let response = h.send(Request::new(Verb::Delete, "/components")).await;
    assert_eq!(response.status, 400);
}

// ── Audit ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_every_recognized_request_is_audited() {
    let h = Harness::start().await;
    h.surface.authenticated(ACTOR, true);

    h.send(Request::new(Verb::Get, "/spaces_view_model")).await;
    h.send(Request::new(Verb::Put, "/spaces/s1").with_body(r#"{"name":"qa"}"#))
        .await;
    h.send(Request::new(Verb::Delete, "/spaces/nope")).await;
    h.send(Request::new(Verb::Delete, "/organizations/o1").with_query("recursive", "true"))
        .await;

    assert_eq!(
        h.audit.lines(),
        vec![
            "[ admin ] : [ authenticated ] : is admin? true",
            "[ admin ] : [ get ] : /spaces_view_model",
            r#"[ admin ] : [ put ] : /spaces/s1; body = {"name":"qa"}"#,
            "[ admin ] : [ delete ] : /spaces/nope",
            "[ admin ] : [ delete ] : /organizations/o1?recursive=true",
        ]
    );
}
