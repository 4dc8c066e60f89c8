use care_triage::app::build_engine;
use care_triage::domain::ports::ConfigProvider;
use care_triage::utils::{logger, validation::Validate};
use care_triage::{EnvConfig, RoutingMode, TomlConfig, TriageError};
use clap::Parser;

#[derive(Parser)]
#[command(name = "ask")]
#[command(about = "Send one patient message through triage and print the reply")]
struct Args {
    /// The patient message to triage
    question: String,

    /// Path to TOML configuration file (environment variables when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Skip triage routing: answer from the guide unless the message is an emergency
    #[arg(long)]
    direct: bool,

    /// Classify and route only; do not call a handler
    #[arg(long)]
    dry_run: bool,

    /// Print the reply as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn fail(e: &TriageError) -> ! {
    tracing::error!(
        "❌ Ask failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());
    std::process::exit(e.exit_code().max(1));
}

async fn ask<P: ConfigProvider + Validate>(args: &Args, config: P) -> Result<(), TriageError> {
    config.validate()?;

    let mut engine = build_engine(&config)?;
    if args.direct {
        engine = engine.with_routing_mode(RoutingMode::Direct);
        tracing::info!("🔧 Routing mode overridden to direct");
    }

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - no handler will be called");
        let (classification, decision) = engine.triage_only(&args.question).await?;

        println!("🔍 Dry Run Analysis:");
        println!("  Category: {}", classification.category);
        if let Some(rationale) = &classification.rationale {
            println!("  Rationale: {}", rationale);
        }
        println!("  Handler: {}", decision.selected_handler);
        println!("  Routing Mode: {:?}", engine.routing_mode());
        return Ok(());
    }

    let response = engine.process(&args.question).await?;

    if args.json {
        let body = serde_json::json!({
            "response": response.text,
            "handler": response.handler_used,
            "warnings": response.warnings,
            "request_id": response.request_id,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("🩺 {}", response.handler_used);
        if !response.warnings.is_empty() {
            println!("⚠️ Warnings: {}", response.warnings.join(", "));
        }
        println!();
        println!("{}", response.text);
        println!();
        println!("📎 Request ID: {}", response.request_id);
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose);

    let result = match &args.config {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path);
            match TomlConfig::from_file(path) {
                Ok(config) => ask(&args, config).await,
                Err(e) => Err(e),
            }
        }
        None => match EnvConfig::from_env() {
            Ok(config) => ask(&args, config).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        fail(&e);
    }
}
