use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use gallery_auth::config::{Settings, ENVIRONMENT_VAR};
use gallery_auth::handlers;
use gallery_auth::state::AppState;
use tracing::{error, info};

mod telemetry;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init_tracing();

    let content_root = std::env::current_dir()?;
    let environment = std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "Production".to_string());

    let settings = match Settings::load(&content_root, &environment) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "failed to load settings");
            std::process::exit(1);
        }
    };

    let state = match AppState::from_settings(settings.clone()) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "failed to build application state");
            std::process::exit(1);
        }
    };

    info!(
        environment = %environment,
        authority = %settings.oidc.authority,
        client_id = %settings.oidc.client_id,
        "starting gallery client on {}:{}",
        settings.server.host,
        settings.server.port
    );

    let data = web::Data::new(state);
    let oidc = settings.oidc.clone();

    HttpServer::new(move || {
        let oidc = oidc.clone();
        App::new()
            .wrap(Logger::default())
            .app_data(data.clone())
            .configure(move |cfg| handlers::configure(cfg, &oidc))
    })
    .bind((settings.server.host.as_str(), settings.server.port))?
    .run()
    .await
}
