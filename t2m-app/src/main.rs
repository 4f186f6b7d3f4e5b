use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use t2m_common::observability::{LogConfig, init_logging};
use t2m_config::{Settings, SettingsLoader};
use wiring::App;
mod wiring;

/// Stream tweets matching the configured track keywords into MongoDB.
#[derive(Parser, Debug)]
#[command(name = "twitter2mongo", version)]
struct Cli {
    /// YAML settings file. `TWITTER2MONGO_*` environment variables override it.
    #[arg(long, env = "TWITTER2MONGO_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Settings (env wins over file)
    let settings = load_settings(&cli)?;

    // 2) Logging
    if let Some(path) = init_logging(settings.log_config())? {
        tracing::info!(log_file = %path.display(), "logging.file");
    }
    tracing::debug!(settings = ?settings, "startup.settings");

    // 3) Store, stream, dispatcher
    let app = App::connect(&settings)
        .await
        .inspect_err(|e| tracing::error!(error = %format!("{e:#}"), "startup.failed"))?;

    app.run().await
}

/// Load settings; on failure, log through a default stdout subscriber first.
fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut loader = SettingsLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    match loader.load() {
        Ok(settings) => Ok(settings),
        Err(err) => {
            init_logging(LogConfig::default())?;
            tracing::error!(error = %err, "startup.settings_invalid");
            Err(err.into())
        }
    }
}
