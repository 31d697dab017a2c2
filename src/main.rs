use std::{path::Path, process::ExitCode};

use anyhow::{Context, Result};

use debug_genie::{
    Orchestrator,
    cli::args_from_env,
    config::Config,
    credentials::CredentialStore,
    logging::init_tracing,
};

const DEFAULT_CONFIG_PATH: &str = "./debug_genie.jsonc";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = args_from_env()?;
    let config = Config::load_or_default(args.config_path.as_deref(), Path::new(DEFAULT_CONFIG_PATH))
        .context("failed to load debug-genie config")?;
    let _logging_guard = init_tracing(&config.logging).context("failed to initialize logging")?;

    let store = CredentialStore::from_env();
    let outcome = match Orchestrator::bootstrap(&store, &config) {
        Ok(orchestrator) => orchestrator.run_rca(&args.ticket_id).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(report) => {
            let rendered =
                serde_json::to_string_pretty(&report).context("failed to render rca report")?;
            println!("{rendered}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("error[{}]: {}", err.kind, err.message);
            Ok(ExitCode::FAILURE)
        }
    }
}
