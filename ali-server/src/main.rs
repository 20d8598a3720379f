use ali_server::{ServerConfig, run_server, telemetry::init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;
    init_logging(&config.log_level, config.log_format);

    run_server(config).await
}
