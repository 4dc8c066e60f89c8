pub mod env;
pub mod toml_config;

pub use env::EnvConfig;
pub use toml_config::TomlConfig;

#[cfg(feature = "cli")]
use clap::Parser;

/// 伺服器命令列參數；模型與文件設定來自 --config 或環境變數
#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "care-triage")]
#[command(about = "Triage and routing service for joint-surgery patient messages")]
pub struct CliConfig {
    /// TOML 配置檔；未指定時改讀環境變數
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(long, default_value = "0.0.0.0")]
    pub bind_address: String,

    #[arg(short, long, default_value = "8000")]
    pub port: u16,

    #[arg(long, help = "Emit JSON log lines")]
    pub json_logs: bool,

    #[arg(long, help = "Report process CPU and memory on /health")]
    pub monitor: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = CliConfig::parse_from(["care-triage"]);
        assert_eq!(cli.bind_address, "0.0.0.0");
        assert_eq!(cli.port, 8000);
        assert!(cli.config.is_none());
        assert!(!cli.monitor);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = CliConfig::parse_from([
            "care-triage",
            "--config",
            "triage-config.toml",
            "--port",
            "9090",
            "--json-logs",
            "-v",
        ]);
        assert_eq!(cli.config.as_deref(), Some("triage-config.toml"));
        assert_eq!(cli.port, 9090);
        assert!(cli.json_logs);
        assert!(cli.verbose);
    }
}
