use data_service::{config::Config, Application};
use service_core::observability::init_tracing;
use service_core::shutdown::shutdown_signal;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(
        &config.service_name,
        &config.server.log_level,
        config.server.otlp_endpoint.as_deref(),
    ) {
        eprintln!("Failed to initialize tracing: {}", e);
        return ExitCode::FAILURE;
    }

    let application = match Application::build(config).await {
        Ok(application) => application,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start data service");
            return ExitCode::FAILURE;
        }
    };

    let outcome = application.run_until_stopped(shutdown_signal()).await;
    tracing::info!(?outcome, "Data service stopped");
    outcome.exit_code()
}
