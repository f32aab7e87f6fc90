use std::sync::Arc;

use rusqlite::params;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::commands::Command;
use crate::database::DatabasePool;

pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    db_pool: Arc<DatabasePool>,
) -> Result<(), anyhow::Error> {
    match cmd {
        Command::Start => {
            // Every /start becomes a broadcast recipient.
            if let Some(user) = msg.from.as_ref() {
                let telegram_id = user.id.0 as i64;
                let result = db_pool
                    .execute_with_timeout(move |conn| {
                        conn.execute(
                            "INSERT OR IGNORE INTO users (telegram_id) VALUES (?1)",
                            params![telegram_id],
                        )
                    })
                    .await;
                if let Err(e) = result {
                    log::error!("Failed to register user {}: {}", telegram_id, e);
                }
            }
            bot.send_message(msg.chat.id, "👋 Welcome! Announcements will arrive here.")
                .await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
    }
    Ok(())
}
