use care_triage::adapters::ask_client::AskServiceClient;
use care_triage::adapters::openai::AzureOpenAiClient;
use care_triage::app::build_engine;
use care_triage::core::evaluation::{load_cases, EvalSummary, Evaluator, Judge, Respondent};
use care_triage::core::retry::RetryPolicy;
use care_triage::domain::ports::ConfigProvider;
use care_triage::utils::{logger, validation::Validate};
use care_triage::{EnvConfig, TomlConfig, TriageError};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "eval")]
#[command(about = "Score triage replies against a CSV of expected answers with an LLM judge")]
struct Args {
    /// CSV with `input` and `expected_output` columns
    #[arg(short, long, default_value = "eval/joint_guide_faq.csv")]
    dataset: String,

    /// Path to TOML configuration file (environment variables when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Base URL of a running service; the engine runs in-process when omitted
    #[arg(short, long)]
    server: Option<String>,

    /// Where to write the JSON report (default: evaluation_results_<timestamp>.json)
    #[arg(short, long)]
    output: Option<String>,

    /// Only evaluate the first N items
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn fail(e: &TriageError) -> ! {
    tracing::error!(
        "❌ Evaluation failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());
    std::process::exit(e.exit_code().max(1));
}

fn print_summary(summary: &EvalSummary) {
    println!("{}", "=".repeat(80));
    println!("📊 EVALUATION RESULTS SUMMARY");
    println!("{}", "=".repeat(80));
    println!("Timestamp: {}", summary.timestamp.to_rfc3339());
    println!("Dataset: {}", summary.dataset_path);
    println!("Total Items: {}", summary.total_items);
    println!("Passed: {}", summary.passed);
    println!("Failed: {}", summary.failed);
    println!("Pass Rate: {}%", summary.pass_rate);
    println!("{}", "=".repeat(80));

    if summary.failed == 0 {
        println!("\n✅ All items passed!");
        return;
    }

    println!("\nFAILED ITEMS:");
    for result in summary.failures() {
        println!("{}", "-".repeat(80));
        println!("Item #{}", result.item_number);
        println!("Input: {}", result.input);
        println!("Expected: {}", preview(&result.expected_output));
        println!("Agent Response: {}", preview(&result.agent_response));
        println!("Explanation: {}", result.explanation);
    }
}

fn preview(text: &str) -> String {
    let mut short: String = text.chars().take(100).collect();
    if short.len() < text.len() {
        short.push_str("...");
    }
    short
}

async fn evaluate<P: ConfigProvider + Validate>(args: &Args, config: P) -> Result<EvalSummary, TriageError> {
    config.validate()?;

    let mut cases = load_cases(&args.dataset)?;
    if let Some(limit) = args.limit {
        cases.truncate(limit);
    }
    tracing::info!("📚 Loaded {} item(s) from {}", cases.len(), args.dataset);

    let respondent: Arc<dyn Respondent> = match &args.server {
        Some(url) => {
            tracing::info!("📡 Sending questions to {}/ask", url.trim_end_matches('/'));
            Arc::new(AskServiceClient::new(url, config.request_timeout() + Duration::from_secs(5))?)
                as Arc<dyn Respondent>
        }
        None => Arc::new(build_engine(&config)?) as Arc<dyn Respondent>,
    };
    let judge = Judge::new(
        Arc::new(AzureOpenAiClient::from_config(&config)?),
        RetryPolicy::from_config(&config),
    );

    let summary = Evaluator::new(respondent, judge).run(&args.dataset, &cases).await;

    let output = args.output.clone().unwrap_or_else(|| {
        format!(
            "evaluation_results_{}.json",
            summary.timestamp.format("%Y%m%d_%H%M%S")
        )
    });
    std::fs::write(&output, serde_json::to_string_pretty(&summary)?)?;
    tracing::info!("📝 Results saved to {}", output);

    Ok(summary)
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
                Ok(config) => evaluate(&args, config).await,
                Err(e) => Err(e),
            }
        }
        None => match EnvConfig::from_env() {
            Ok(config) => evaluate(&args, config).await,
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(summary) => {
            print_summary(&summary);
            // 有任何未通過的題目就以非零碼結束
            if summary.failed > 0 {
                std::process::exit(1);
            }
        }
        Err(e) => fail(&e),
    }
}
