//! View command: poll once and print one view model or one row's detail.

use serde_json::Value;

use overseer_config::Config;

use crate::cli::{GlobalOpts, OutputFormat, ViewArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: &ViewArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let resource = util::parse_resource(&args.resource)?;
    let config = util::engine_config(cfg, global)?;
    let engine = util::start_engine(&config).await?;

    let model = engine.aggregator.view(resource);
    let rendered = match args.key.as_deref() {
        Some(key) => engine
            .aggregator
            .detail(resource, key)
            .map_err(CliError::from)
            .and_then(|detail| output::render_value(&global.output, &Value::Object(detail))),
        None => match global.output {
            OutputFormat::Table | OutputFormat::Plain => {
                let rows: Vec<&[Value]> = model.entries.values().map(|e| e.cells.as_slice()).collect();
                if !global.quiet {
                    let color = output::should_color(&global.color);
                    eprintln!(
                        "{resource}: {} rows, {}",
                        rows.len(),
                        output::connection_badge(model.connected, color)
                    );
                }
                output::render_rows(&global.output, &rows)
            }
            _ => serde_json::to_value(model.table())
                .map_err(|e| CliError::Core {
                    message: format!("JSON serialization failed: {e}"),
                })
                .and_then(|table| output::render_value(&global.output, &table)),
        },
    };

    engine.shutdown().await;
    output::print_output(&rendered?, global.quiet);
    Ok(())
}
