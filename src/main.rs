use std::sync::Arc;

use anyhow::Error;
use teloxide::dptree;
use teloxide::prelude::*;

use crate::broadcast::rate_limit::RateLimiter;
use crate::broadcast::store::SqliteJobStore;
use crate::broadcast::supervisor::BroadcastSupervisor;
use crate::commands::{AdminCommand, Command};
use crate::database::DatabasePool;
use crate::handlers::{admin_command_handler, command_handler};
use crate::telegram::TelegramTransport;

mod broadcast;
mod commands;
mod config;
mod database;
mod handlers;
mod telegram;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // --- Logging Setup ---
    use log::LevelFilter;
    use std::env;
    use std::io::Write;

    let console_level_str = env::var("CONSOLE_LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    let console_level = match console_level_str.to_uppercase().as_str() {
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        _ => LevelFilter::Info, // Default to Info
    };

    let mut builder = pretty_env_logger::formatted_builder();
    builder
        .filter(None, console_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    log::info!("Starting broadcast bot...");
    let start_time = std::time::Instant::now();

    if let Err(e) = config::load_environment() {
        log::error!("Failed to load environment: {}", e);
        return Err(e);
    }

    let db_path = database::get_database_path();
    if let Err(e) = database::init_database(&db_path) {
        log::error!("Failed to initialize the database: {}", e);
        return Err(e);
    }
    log::info!("Database initialized at {:?}", db_path);

    let db_pool = Arc::new(DatabasePool::new(
        &db_path,
        3, // Maximum 3 simultaneous database connections
    )?);
    let store = Arc::new(SqliteJobStore::new(Arc::clone(&db_pool)));

    let rate_config = config::rate_limiter_config();
    log::info!(
        "Rate limits: {} msg per {:?} global, 1 msg per {:?} per recipient",
        rate_config.global_limit,
        rate_config.global_window,
        rate_config.recipient_window
    );
    let limiter = Arc::new(RateLimiter::new(rate_config));

    let bot = Bot::from_env();
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let supervisor = Arc::new(BroadcastSupervisor::new(
        transport,
        store.clone(),
        limiter,
        config::checkpoint_every(),
    ));

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<AdminCommand>()
                .endpoint(admin_command_handler),
        )
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(command_handler),
        );

    log::info!("Bot initialization completed in {:.2?}", start_time.elapsed());
    log::info!("Starting to dispatch updates...");

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![supervisor.clone(), db_pool, store])
        .enable_ctrlc_handler()
        .build();

    // Run dispatcher with graceful shutdown
    tokio::select! {
        _ = dispatcher.dispatch() => {},
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received Ctrl+C, shutting down...");
        }
    }

    // Any in-flight broadcasts are stopped cooperatively; their last
    // checkpoint lets an operator see how far each one got.
    let stopped = supervisor.stop_all().await;
    if stopped > 0 {
        log::info!("Signaled {} in-flight broadcast(s) to stop", stopped);
    }

    log::info!("Bot shutdown complete");
    Ok(())
}
