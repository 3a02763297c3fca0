mod config;
mod executor;
mod handlers;
mod monitor;
mod queue;
mod state;
mod webhook;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use dotenv::dotenv;
use pretty_env_logger::env_logger::{Builder, Env};

use crate::config::AppConfig;
use crate::executor::TransactionExecutor;
use crate::queue::{DelayQueue, SCHEDULED_TX_QUEUE};
use crate::state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    if cli::run_cli().await {
        return Ok(());
    }

    let logger_env = Env::default().default_filter_or("info");
    let mut logger_builder = Builder::from_env(logger_env);
    logger_builder.init();

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Application initialization failed: {:#}", e);
        std::io::Error::other(e.to_string())
    })?;

    let state = Arc::new(AppState::new(&config).await.map_err(|e| {
        log::error!("Application initialization failed: {:#}", e);
        std::io::Error::other(e.to_string())
    })?);

    log::info!("App state initialized successfully");

    let queue = DelayQueue::new(state.db.clone(), SCHEDULED_TX_QUEUE);
    queue.start_workers(Arc::new(TransactionExecutor::new(state.clone())));

    monitor::start(state.clone());

    let data = web::Data::new(state);
    let queue_data = web::Data::new(queue);
    let bind = (config.host.clone(), config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .app_data(queue_data.clone())
            .wrap(Logger::new("%a %t %r %s  %{Referer}i %Dms"))
            .service(handlers::health)
            .service(handlers::notion_webhook)
    })
    .bind(bind)?
    .run()
    .await
}
