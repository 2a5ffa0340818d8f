//! Config subcommand handlers.

use std::io::IsTerminal;

use overseer_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

pub fn handle(args: ConfigArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let rendered = overseer_config::render_redacted(cfg)?;
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&util::config_file(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetSecret { client_id } => {
            let client_id = client_id
                .or_else(|| cfg.credentials.as_ref().map(|c| c.client_id.clone()))
                .ok_or_else(|| CliError::Validation {
                    field: "client_id".into(),
                    reason: "pass --client-id or set [credentials].client_id".into(),
                })?;

            let secret = read_secret()?;
            overseer_config::store_client_secret(&client_id, &secret)?;

            if !global.quiet {
                eprintln!("Client secret for '{client_id}' stored in the system keyring");
            }
            Ok(())
        }
    }
}

/// Prompt without echo on a terminal; read one line when stdin is piped.
fn read_secret() -> Result<String, CliError> {
    let stdin = std::io::stdin();
    let secret = if stdin.is_terminal() {
        rpassword::prompt_password("Client secret: ")
    } else {
        rpassword::read_password_from_bufread(&mut stdin.lock())
    }
    .map_err(prompt_err)?;
    non_empty(secret)
}

fn non_empty(secret: String) -> Result<String, CliError> {
    if secret.trim().is_empty() {
        return Err(CliError::Validation {
            field: "secret".into(),
            reason: "value cannot be empty".into(),
        });
    }
    Ok(secret)
}

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "secret".into(),
        reason: format!("prompt failed: {e}"),
    }
}
