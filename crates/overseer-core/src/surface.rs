// ── Request surface ──
//
// Framework-free routing for the admin console's JSON endpoints. The HTTP
// layer owns sessions and sockets and hands every request to
// `AdminSurface::handle` together with the authenticated actor.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::audit::AuditLogger;
use crate::dispatch::{Dispatcher, Operation, Verb};
use crate::engine::Aggregator;
use crate::error::CoreError;
use crate::model::ResourceType;

const NOT_FOUND_BODY: &str = "Page Not Found";
const CONTENT_JSON: &str = "application/json";
const CONTENT_TEXT: &str = "text/plain";

#[derive(Debug, Clone)]
pub struct Request {
    pub verb: Verb,
    /// Path without the query string, e.g. `/organizations/o1`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Request {
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
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

    /// Path plus query string, as written to the audit log.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query: Vec<String> = self.query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}?{}", self.path, query.join("&"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn json(value: &impl Serialize) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self {
                status: 200,
                content_type: CONTENT_JSON,
                body,
            },
            Err(e) => Self::error(&CoreError::Internal(e.to_string())),
        }
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            content_type: CONTENT_TEXT,
            body: String::new(),
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            content_type: CONTENT_TEXT,
            body: NOT_FOUND_BODY.to_owned(),
        }
    }

    fn error(err: &CoreError) -> Self {
        let body = match err {
            CoreError::BackingOperationFailed { body, .. } => body.clone(),
            CoreError::NotFound { .. } => NOT_FOUND_BODY.to_owned(),
            other => other.to_string(),
        };
        Self {
            status: err.http_status(),
            content_type: CONTENT_TEXT,
            body,
        }
    }
}

#[derive(Clone)]
pub struct AdminSurface {
    aggregator: Aggregator,
    dispatcher: Dispatcher,
    audit: Arc<AuditLogger>,
}

impl AdminSurface {
    pub fn new(aggregator: Aggregator, dispatcher: Dispatcher, audit: Arc<AuditLogger>) -> Self {
        Self {
            aggregator,
            dispatcher,
            audit,
        }
    }

    /// Record a completed login.
    pub fn authenticated(&self, actor: &str, admin: bool) {
        self.audit.authenticated(actor, admin);
    }

    /// Route one request. Unknown routes get `404 Page Not Found` and no
    /// audit line; every recognized request is audited before it runs.
    pub async fn handle(&self, actor: &str, request: &Request) -> Response {
        let segments: Vec<&str> = request
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let response = match request.verb {
            Verb::Get => self.read(actor, request, &segments),
            _ => self.mutate(actor, request, &segments).await,
        };
        debug!(verb = %request.verb, path = %request.path, status = response.status, "handled");
        response
    }

    fn read(&self, actor: &str, request: &Request, segments: &[&str]) -> Response {
        match segments {
            ["current_statistics"] => {
                self.audit.request(actor, Verb::Get, &request.target(), None);
                Response::json(&self.aggregator.current_statistics())
            }
            [view, key @ ..] => {
                let Some(resource) = ResourceType::from_view_segment(view) else {
                    return Response::not_found();
                };
                self.audit.request(actor, Verb::Get, &request.target(), None);

                let model = self.aggregator.view(resource);
                if key.is_empty() {
                    return Response::json(&model.table());
                }
                match model.detail(&key.join("/")) {
                    Some(detail) => Response::json(detail),
                    None => Response::not_found(),
                }
            }
            [] => Response::not_found(),
        }
    }

    async fn mutate(&self, actor: &str, request: &Request, segments: &[&str]) -> Response {
        let Some((resource, rest)) = segments.split_first() else {
            return Response::not_found();
        };
        let operation = Operation {
            verb: request.verb,
            resource: (*resource).to_owned(),
            segments: rest.iter().map(|s| (*s).to_owned()).collect(),
            query: request.query.clone(),
            body: request.body.clone(),
        };
        if !Dispatcher::recognizes(&operation) {
            return Response::not_found();
        }

        self.audit
            .request(actor, request.verb, &request.target(), request.body.as_deref());

        match self.dispatcher.dispatch(&operation).await {
            Ok(()) => Response::no_content(),
            Err(e) => {
                warn!(verb = %request.verb, path = %request.path, error = %e, "operation failed");
                Response::error(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_renders_query_flags() {
        let request = Request::new(Verb::Delete, "/service_instances/si1/true")
            .with_query("recursive", "true")
            .with_query("purge", "true");
        assert_eq!(
            request.target(),
            "/service_instances/si1/true?recursive=true&purge=true"
        );
    }

    #[test]
    fn backing_failures_forward_status_and_body() {
        let response = Response::error(&CoreError::BackingOperationFailed {
            status: 422,
            body: r#"{"code":10008}"#.into(),
        });
        assert_eq!(response.status, 422);
        assert_eq!(response.body, r#"{"code":10008}"#);

        let response = Response::error(&CoreError::MalformedInput {
            message: "bad".into(),
        });
        assert_eq!(response.status, 400);
    }
}
