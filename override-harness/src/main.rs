use std::process::ExitCode;

use envconfig::Envconfig;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use override_harness::config::Config;
use override_harness::verifier::run_all;

fn init_logging(debug: bool) {
    // Pretty colored output with span events when DEBUG is set, JSON otherwise
    let log_layer = {
        let base_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true);

        if debug {
            base_layer
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_ansi(true)
                .with_filter(EnvFilter::from_default_env())
                .boxed()
        } else {
            base_layer
                .json()
                .with_filter(EnvFilter::from_default_env())
                .boxed()
        }
    };

    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::init_from_env().expect("Invalid configuration:");
    init_logging(*config.debug);

    tracing::info!(agent_url = config.agent_url, "verifying override contract");
    let report = match run_all(&config).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("failed to set up sessions: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let failed = report.failures().count();
    if failed == 0 {
        tracing::info!(
            scenarios = report.outcomes().len(),
            "override contract verified"
        );
        ExitCode::SUCCESS
    } else {
        tracing::error!(
            scenarios = report.outcomes().len(),
            failed,
            "override contract violated"
        );
        ExitCode::FAILURE
    }
}
