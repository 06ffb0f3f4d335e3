use actix_web::{web, App, HttpServer};
use log::{error, info};
use std::io;

use fs_image_store::api::configure_routes;
use fs_image_store::app_state::AppState;
use fs_image_store::config::AppConfig;
use fs_image_store::logging;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = AppConfig::load()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    logging::init(&config.logging);

    let app_state = AppState::from_config(config).map_err(|e| {
        error!("Failed to configure image store: {}", e);
        io::Error::new(io::ErrorKind::Other, e)
    })?;

    let host = app_state.config.server.host.clone();
    let port = app_state.config.server.port;
    let max_payload_size = app_state.config.server.max_payload_size;
    info!("Starting image store on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(web::PayloadConfig::default().limit(max_payload_size))
            .app_data(web::Data::new(app_state.clone()))
            .configure(configure_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
