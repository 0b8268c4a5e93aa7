use actix_web::{middleware::Logger, web, App, HttpServer};
use altius_feeds::{configure, AppState, Args};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let address = format!("{}:{}", args.ip, args.port);

    let app_state = AppState::new(args).map_err(|e| {
        error!("Failed to initialize HTTP client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "HTTP client initialization failed")
    })?;
    let app_state = web::Data::new(app_state);

    info!(
        graph = app_state.config.access_token().is_some(),
        scraperapi = app_state.config.scraperapi_key.is_some(),
        scrapingbee = app_state.config.scrapingbee_key.is_some(),
        "Server running at http://{}",
        address
    );
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(configure)
    })
    .bind(&address)?
    .run()
    .await
}
