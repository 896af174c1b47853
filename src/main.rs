use anyhow::Context;
use code_analyst::{cli::config_path_from_args, config::Config, logging::init_tracing, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_path_from_args()?;
    let config = Config::resolve(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("failed to load config from {}", path.display()),
        None => "failed to resolve config from environment".to_string(),
    })?;

    let logging_guard = init_tracing(&config)?;
    tracing::info!(target: "main", run_id = logging_guard.run_id(), "code_analyst_starting");

    server::run(config).await
}
