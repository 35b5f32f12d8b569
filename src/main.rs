use std::process::ExitCode;
use std::sync::Arc;

use exceedance_service::config::Config;
use exceedance_service::datasets::Registry;
use exceedance_service::engine::ProbabilityEngine;
use exceedance_service::ingest::opendap::OpendapSource;
use exceedance_service::logging::{self, Component};
use exceedance_service::server;

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = match config.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init_logger(level, config.logging.file.as_deref(), config.logging.timestamps);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::error(Component::System, None, &e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), String> {
    let registry = Registry::builtin().map_err(|e| format!("dataset registry invalid: {}", e))?;

    // The blocking reqwest client owns its own runtime; build it (and later
    // drop it) outside of tokio.
    let source = OpendapSource::new(
        config.source_timeout(),
        &config.source.user_agent,
        config.credentials.clone(),
    )
    .map_err(|e| format!("cannot build HTTP client: {}", e))?;

    if config.credentials.is_none() {
        logging::warn(
            Component::System,
            None,
            "EARTHDATA_USERNAME/EARTHDATA_PASSWORD not set; protected datasets will fall back to synthetic data",
        );
    }

    let engine = Arc::new(ProbabilityEngine::new(Arc::new(registry), source));
    let app = server::router(Arc::clone(&engine));
    let address = config.bind_address();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("cannot start runtime: {}", e))?;

    let served = runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| format!("cannot bind {}: {}", address, e))?;

        logging::info(
            Component::System,
            None,
            &format!("{} v{} listening on {}", server::SERVICE_NAME, server::SERVICE_VERSION, address),
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| format!("server error: {}", e))
    });

    // Finish the runtime before the last engine reference goes away.
    drop(runtime);
    drop(engine);

    logging::info(Component::System, None, "shut down");
    served
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
}
