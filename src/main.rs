use std::process::ExitCode;

use tracing::{error, info};

use wis2bridge::bridge::{Bridge, shutdown};
use wis2bridge::config::load_config;
use wis2bridge::credentials::IotCertificateStore;
use wis2bridge::utils::logging;

#[tokio::main]
async fn main() -> ExitCode {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            let _ = logging::init("info", None);
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&settings.log.level, settings.log.file.as_deref()) {
        error!("Failed to open log file: {}", e);
        return ExitCode::FAILURE;
    }

    let (trigger, signal) = shutdown::channel();
    shutdown::listen_for_signals(trigger);

    let store = IotCertificateStore::from_env(settings.destination.region.as_deref()).await;
    let bridge = match Bridge::start(&settings, &store).await {
        Ok(bridge) => bridge,
        Err(e) => {
            error!(error = ?e, "Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let state = bridge.run(signal).await;
    info!("Bridge {}. Exiting.", state);
    ExitCode::SUCCESS
}
