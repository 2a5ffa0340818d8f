//! Request command: route one console request through the admin surface.

use std::sync::Arc;

use serde_json::Value;

use overseer_config::Config;
use overseer_core::{AdminSurface, AuditLogger, Dispatcher, Request, Verb};

use crate::cli::{GlobalOpts, RequestArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: &RequestArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let request = build_request(args)?;
    let config = util::engine_config(cfg, global)?;
    let audit = AuditLogger::standard(config.audit_file.as_deref())?;

    let engine = util::start_engine(&config).await?;
    let dispatcher = Dispatcher::new(engine.aggregator.clone(), Arc::clone(&engine.backend));
    let surface = AdminSurface::new(engine.aggregator.clone(), dispatcher, Arc::new(audit));

    let response = surface.handle(&args.actor, &request).await;
    engine.shutdown().await;

    if response.status >= 400 {
        return Err(CliError::RequestFailed {
            status: response.status,
            body: response.body,
        });
    }
    if response.body.is_empty() {
        return Ok(());
    }

    let rendered = match serde_json::from_str::<Value>(&response.body) {
        Ok(value) => output::render_value(&global.output, &value)?,
        Err(_) => response.body,
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn build_request(args: &RequestArgs) -> Result<Request, CliError> {
    let verb: Verb = args.verb.parse().map_err(|_| CliError::Validation {
        field: "verb".into(),
        reason: format!("expected get, put, post or delete, got '{}'", args.verb),
    })?;

    let mut request = Request::new(verb, &args.path);
    for pair in &args.query {
        let (name, value) = pair.split_once('=').ok_or_else(|| CliError::Validation {
            field: "query".into(),
            reason: format!("expected NAME=VALUE, got '{pair}'"),
        })?;
        request = request.with_query(name, value);
    }
    if let Some(body) = &args.data {
        request = request.with_body(body);
    }
    Ok(request)
}
