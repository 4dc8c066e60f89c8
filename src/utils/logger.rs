use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// RUST_LOG 優先；否則依 verbose 決定本 crate 的層級
fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "care_triage=debug,info"
        } else {
            "care_triage=info,warn"
        })
    })
}

pub fn init_cli_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// 伺服器模式：JSON 輸出帶上目前 span 的 request_id / trace_id
pub fn init_server_logger(verbose: bool, json: bool) {
    if !json {
        init_cli_logger(verbose);
        return;
    }

    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();
}

pub fn init_lambda_logger() {
    tracing_subscriber::registry()
        .with(default_filter(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .without_time()
                .json(), // CloudWatch 已有時間戳
        )
        .init();
}
