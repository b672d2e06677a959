use actix_web::{middleware, web, App, HttpServer};
use ergot_server::config::AppConfig;
use ergot_server::routes::configure_routes;
use ergot_server::Services;
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(format!("Configuration failed: {}", e))
    })?;

    log::info!("Model path:  {}", config.model.path.display());
    log::info!("Static dir:  {}", config.static_dir.display());
    log::info!("Uploads dir: {}", config.uploads_dir().display());

    // The listener is never bound without a loaded model.
    let services = Services::from_config(&config).map_err(|e| {
        log::error!("Failed to start: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let prediction = web::Data::new(services.prediction);
    let renderer = web::Data::new(services.renderer);
    let static_dir = config.static_dir.clone();
    let bind_address = config.bind_address();

    log::info!("Starting server on {}", bind_address);

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(prediction.clone())
            .app_data(renderer.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    });
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    server.bind(&bind_address)?.run().await
}
