use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod services;
mod utils;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::services::{auto_reject, geocode::Geocoder, layouts::LayoutStore, notifier::NotificationHub};
use crate::utils::identity_filter;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "TMD System API"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let pool = init_db(&config.database_url).await?;

    let pool_for_filter_warmup = pool.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = identity_filter::warmup_identity_filter(&pool_for_filter_warmup, 500).await {
            warn!(error = ?e, "Failed to warm up identity filter");
        }
    });

    let hub = NotificationHub::new(config.notification_buffer);
    auto_reject::spawn(
        pool.clone(),
        hub.clone(),
        config.auto_reject_after_days,
        config.auto_reject_interval_secs,
    );

    let hub = Data::new(hub);
    let geocoder = Data::new(Geocoder::new(config.geocoding_url.clone()));
    let layouts = Data::new(LayoutStore::new(&config.layout_dir, &config.layout_backup_dir));
    let pool = Data::new(pool);
    let config_data = Data::new(config.clone());
    let server_addr = config.server_addr.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(pool.clone())
            .app_data(config_data.clone())
            .app_data(hub.clone())
            .app_data(geocoder.clone())
            .app_data(layouts.clone())
            .service(index)
            // auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await
    .context("Server error")
}
