use std::path::Path;

use actix_web::{web, App, HttpServer};
use log::{error, info, warn};

use resumable_upload::api;
use resumable_upload::app_state::AppState;
use resumable_upload::config::AppConfig;
use resumable_upload::service::events::run_event_logger;

fn init_logging(config_file: &str) {
    if Path::new(config_file).exists() {
        if let Err(e) = log4rs::init_file(config_file, Default::default()) {
            env_logger::init();
            warn!("Failed to load log config {}: {}", config_file, e);
        }
    } else {
        env_logger::init();
        info!("Log config {} not found, logging to stderr", config_file);
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::load().map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    init_logging(&config.logging.config_file);

    let state = AppState::from_config(config.clone()).map_err(|e| {
        error!("Failed to initialize application state: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;
    tokio::spawn(run_event_logger(state.service.subscribe()));

    let host = config.server.host.clone();
    let port = config.server.port;
    let base_path = config.upload.base_path.clone();
    // Body extractors buffer at most one chunk plus JSON metadata.
    let payload_limit = usize::try_from(config.upload.max_chunk_size).unwrap_or(usize::MAX);
    info!("Starting server on {}:{} serving {}", host, port, base_path);

    let data = web::Data::new(state);
    HttpServer::new(move || {
        let base_path = base_path.clone();
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(data.clone())
            .app_data(web::PayloadConfig::default().limit(payload_limit))
            .configure(|cfg| api::configure(cfg, &base_path))
    })
    .workers(config.server.workers)
    .bind((host.as_str(), port))?
    .run()
    .await
}
