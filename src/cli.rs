use std::{env, path::PathBuf};

use anyhow::{Result, anyhow};

const USAGE: &str = "usage: debug-genie [--config <path>] <ticket-id>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub ticket_id: String,
}

pub fn args_from_env() -> Result<CliArgs> {
    parse_args(env::args().skip(1))
}

pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut args = args.into_iter();
    let mut config_path = None;
    let mut ticket_id = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("missing value for --config. {USAGE}"))?;
                config_path = Some(PathBuf::from(value));
            }
            other if other.starts_with("--") => {
                return Err(anyhow!("unknown argument: {other}. {USAGE}"));
            }
            other => {
                if ticket_id.is_some() {
                    return Err(anyhow!("only one ticket id is accepted. {USAGE}"));
                }
                ticket_id = Some(other.to_string());
            }
        }
    }

    let ticket_id = ticket_id.ok_or_else(|| anyhow!("missing ticket id. {USAGE}"))?;
    Ok(CliArgs {
        config_path,
        ticket_id,
    })
}
