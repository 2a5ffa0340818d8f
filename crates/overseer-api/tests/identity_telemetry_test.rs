// Integration tests for `IdentityClient` and `TelemetryClient` using wiremock.
#![allow(clippy::unwrap_used)]

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use overseer_api::{IdentityClient, Method, TelemetryClient};

// ── Identity ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_identity_users_page_by_start_index() {
    let server = MockServer::start().await;
    let client =
        IdentityClient::from_reqwest(&server.uri(), reqwest::Client::new(), None).unwrap();

    let page = |start: u64, ids: &[&str]| {
        json!({
            "resources": ids.iter().map(|id| json!({"id": id, "userName": format!("user-{id}")})).collect::<Vec<_>>(),
            "startIndex": start,
            "itemsPerPage": 100,
            "totalResults": 3
        })
    };

    Mock::given(method("GET"))
        .and(path("/Users"))
        .and(query_param("startIndex", "1"))
        .and(query_param("count", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(1, &["u1", "u2"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Users"))
        .and(query_param("startIndex", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(3, &["u3"])))
        .mount(&server)
        .await;

    let users = client.list_users().await.unwrap();
    let ids: Vec<_> = users.iter().map(|u| u["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["u1", "u2", "u3"]);
}

#[tokio::test]
async fn test_identity_clients_and_groups() {
    let server = MockServer::start().await;
    let client =
        IdentityClient::from_reqwest(&server.uri(), reqwest::Client::new(), None).unwrap();

    Mock::given(method("GET"))
        .and(path("/oauth/clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [{ "client_id": "cf", "scope": ["openid"] }],
            "startIndex": 1, "itemsPerPage": 100, "totalResults": 1
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [], "startIndex": 1, "itemsPerPage": 100, "totalResults": 0
        })))
        .mount(&server)
        .await;

    let clients = client.list_clients().await.unwrap();
    assert_eq!(clients[0]["client_id"], "cf");
    assert!(client.list_groups().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_identity_zones_and_providers_are_bare_arrays() {
    let server = MockServer::start().await;
    let client =
        IdentityClient::from_reqwest(&server.uri(), reqwest::Client::new(), None).unwrap();

    Mock::given(method("GET"))
        .and(path("/identity-zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "uaa", "subdomain": "", "name": "uaa" }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/identity-providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "idp1", "originKey": "uaa", "type": "uaa", "identityZoneId": "uaa" },
            { "id": "idp2", "originKey": "ldap", "type": "ldap", "identityZoneId": "uaa" }
        ])))
        .mount(&server)
        .await;

    let zones = client.list_identity_zones().await.unwrap();
    assert_eq!(zones[0]["name"], "uaa");
    let providers = client.list_identity_providers().await.unwrap();
    assert_eq!(providers.len(), 2);
    assert_eq!(providers[1]["originKey"], "ldap");
}

#[tokio::test]
async fn test_identity_delete_forwards_status() {
    let server = MockServer::start().await;
    let client =
        IdentityClient::from_reqwest(&server.uri(), reqwest::Client::new(), None).unwrap();

    Mock::given(method("DELETE"))
        .and(path("/Users/u1"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let err = client
        .send(Method::DELETE, "/Users/u1", &[], None)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
}

// ── Telemetry ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_discover_keeps_components_whose_scrape_fails() {
    let server = MockServer::start().await;
    let healthy = MockServer::start().await;
    let broken = MockServer::start().await;

    let healthy_host = healthy.address().to_string();
    let broken_host = broken.address().to_string();

    Mock::given(method("GET"))
        .and(path("/components"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "type": "DEA", "index": 0, "host": healthy_host, "credentials": ["varz", "pw"] },
            { "type": "Router", "index": 1, "host": broken_host }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/varz"))
        .and(header("authorization", "Basic dmFyejpwdw=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "DEA", "index": 0, "cpu": 3.5, "mem": 1024
        })))
        .mount(&healthy)
        .await;

    Mock::given(method("GET"))
        .and(path("/varz"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;

    let client = TelemetryClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    let statuses = client.discover().await.unwrap();

    assert_eq!(statuses.len(), 2);
    let dea = &statuses[0];
    assert_eq!(dea.registration.component_type, "DEA");
    assert_eq!(dea.uri, format!("http://{healthy_host}/varz"));
    assert_eq!(dea.varz.as_ref().unwrap()["mem"], 1024);

    let router = &statuses[1];
    assert_eq!(router.registration.component_type, "Router");
    assert!(router.varz.is_err());
}

#[tokio::test]
async fn test_discover_fails_when_registry_is_down() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/components"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = TelemetryClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    let err = client.discover().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}
