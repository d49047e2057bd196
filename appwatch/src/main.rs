use std::process::ExitCode;

use appwatch_core::{build_client, RunConfig, UpdateChecker, EXIT_CONFIG_ERROR};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Local runs may keep settings in .env; in CI the variables come from secrets.
    dotenvy::dotenv().ok();
    init_tracing();

    let config = match load_config(|key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(code) => return ExitCode::from(code),
    };
    info!(
        push_method = %config.push_method(),
        apps = config.app_ids.len(),
        cache = %config.cache_path.display(),
        "configuration loaded"
    );

    let client = match build_client(config.request_timeout) {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let checker = UpdateChecker::from_config(&config, client);
    let summary = checker.run(&config.app_ids).await;
    summary.log();

    ExitCode::from(summary.exit_code())
}

/// Reads the run configuration, mapping any problem to the process exit code.
fn load_config<F>(lookup: F) -> Result<RunConfig, u8>
where
    F: Fn(&str) -> Option<String>,
{
    RunConfig::from_lookup(lookup).map_err(|err| {
        error!(error = %err, "invalid configuration");
        EXIT_CONFIG_ERROR
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
