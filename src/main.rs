use care_triage::adapters::http;
use care_triage::app::build_engine;
use care_triage::domain::ports::ConfigProvider;
use care_triage::utils::monitor::SystemMonitor;
use care_triage::utils::{logger, validation::Validate};
use care_triage::{CliConfig, EnvConfig, TomlConfig, TriageError};
use clap::Parser;
use std::sync::Arc;

fn exit_with(context: &str, e: &TriageError) -> ! {
    tracing::error!(
        "❌ {}: {} (Category: {:?}, Severity: {:?})",
        context,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());
    std::process::exit(e.exit_code().max(1));
}

async fn run_server<P: ConfigProvider + Validate>(cli: &CliConfig, config: P) -> anyhow::Result<()> {
    // 驗證配置
    if let Err(e) = config.validate() {
        exit_with("Configuration validation failed", &e);
    }

    let engine = match build_engine(&config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => exit_with("Startup failed", &e),
    };

    let monitor_enabled = cli.monitor || config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }
    let monitor = Arc::new(SystemMonitor::new(monitor_enabled));

    let app = http::router(engine, Arc::clone(&monitor));
    http::serve(&cli.bind_address, cli.port, app).await?;

    monitor.log_final_stats();
    tracing::info!("✅ Server stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    match &cli.config {
        Some(path) => {
            let config = match TomlConfig::from_file(path) {
                Ok(config) => config,
                Err(e) => {
                    logger::init_server_logger(cli.verbose, cli.json_logs);
                    exit_with(&format!("Failed to load {}", path), &e);
                }
            };

            // 初始化日誌
            logger::init_server_logger(cli.verbose, cli.json_logs || config.json_logs());
            tracing::info!("📋 Loaded configuration from {}", path);
            run_server(&cli, config).await
        }
        None => {
            logger::init_server_logger(cli.verbose, cli.json_logs);
            let config = match EnvConfig::from_env() {
                Ok(config) => config,
                Err(e) => exit_with("Failed to read environment configuration", &e),
            };
            tracing::info!("📋 Loaded configuration from environment");
            run_server(&cli, config).await
        }
    }
}
