use actix_web::{web, App, HttpServer};
use chatroulette_server::{session, websocket, AppError, AppState, Settings};
use dotenv::dotenv;
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> chatroulette_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded for {} environment", config.environment);

    let state = AppState::new(config.clone());

    let raw_listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.raw_port)).await?;
    let listener = TcpListener::bind((config.server.host.as_str(), config.server.http_port))?;

    info!(
        "Chat page at http://{0}, websocket chat at ws://{0}/",
        config.server.public_addr()
    );

    let data = web::Data::new(state.clone());
    let http = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(websocket::configure)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run();

    // Whichever listener fails first takes the process down with it.
    tokio::select! {
        res = http => res.map_err(|e| AppError::InternalError(e.to_string()))?,
        res = session::serve_raw(raw_listener, state) => res?,
    }

    Ok(())
}
