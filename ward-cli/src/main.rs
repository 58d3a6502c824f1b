use clap::Parser;
use logger_redacted::LoggerConfig;
use vitals_engine::EngineConfig;
use ward_cli::{commands, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays machine-readable
    let _logging = logger_redacted::init(&LoggerConfig {
        log_level: cli.log_level().to_string(),
        stderr: true,
        ..LoggerConfig::default()
    })?;

    let config = EngineConfig::load(cli.config.as_deref())?;
    tracing::debug!(command = ?cli.command, "Running wardctl");

    let output = commands::run(&cli, &config).await?;
    println!("{output}");
    Ok(())
}
