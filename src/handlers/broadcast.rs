use std::sync::Arc;

use teloxide::prelude::*;
use uuid::Uuid;

use crate::broadcast::job::JobStatus;
use crate::broadcast::store::{JobStore, SqliteJobStore};
use crate::broadcast::supervisor::BroadcastSupervisor;
use crate::commands::AdminCommand;
use crate::database::DatabasePool;
use crate::handlers::admin::is_admin;

pub async fn admin_command_handler(
    bot: Bot,
    msg: Message,
    cmd: AdminCommand,
    supervisor: Arc<BroadcastSupervisor>,
    db_pool: Arc<DatabasePool>,
    store: Arc<SqliteJobStore>,
) -> Result<(), anyhow::Error> {
    if !is_admin(&msg).await {
        bot.send_message(msg.chat.id, "⛔ Admins only.").await?;
        return Ok(());
    }

    match cmd {
        AdminCommand::Broadcast { text } => {
            start_text_broadcast(&bot, &msg, text, supervisor, db_pool).await
        }
        AdminCommand::StopCast { id } => stop_broadcast(&bot, &msg, &id, supervisor).await,
        AdminCommand::StopAllCasts => {
            let stopped = supervisor.stop_all().await;
            bot.send_message(msg.chat.id, format!("🛑 Signaled {} broadcast(s).", stopped))
                .await?;
            Ok(())
        }
        AdminCommand::Casts => list_broadcasts(&bot, &msg, store).await,
    }
}

async fn start_text_broadcast(
    bot: &Bot,
    msg: &Message,
    text: String,
    supervisor: Arc<BroadcastSupervisor>,
    db_pool: Arc<DatabasePool>,
) -> Result<(), anyhow::Error> {
    let author = match msg.from.as_ref() {
        Some(user) => user.id.0 as i64,
        None => return Ok(()),
    };
    if text.trim().is_empty() {
        bot.send_message(msg.chat.id, "Usage: /broadcast <text> (HTML supported).")
            .await?;
        return Ok(());
    }

    // Recipient resolution: everyone who ever pressed /start.
    let recipients = db_pool
        .execute_with_timeout(|conn| {
            let mut stmt = conn.prepare("SELECT telegram_id FROM users")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            let mut users = Vec::new();
            for user in rows {
                users.push(user?);
            }
            Ok(users)
        })
        .await;

    let recipients = match recipients {
        Ok(recipients) => recipients,
        Err(e) => {
            log::error!("Recipient query failed: {}", e);
            bot.send_message(msg.chat.id, "❌ Database error.").await?;
            return Ok(());
        }
    };

    let mut job = supervisor.create_draft(author).await;
    job.text = Some(text);
    job.status = JobStatus::Pending;

    let total = recipients.len();
    match supervisor.start_dispatch(job, recipients).await {
        Ok(id) => {
            supervisor.clear_draft(author).await;
            bot.send_message(
                msg.chat.id,
                format!("🚀 Broadcast {} started ({} recipients).", id, total),
            )
            .await?;
        }
        Err(e) => {
            // Job stays pending; the admin can correct and retry.
            bot.send_message(msg.chat.id, format!("❌ Not started: {}", e))
                .await?;
        }
    }
    Ok(())
}

async fn stop_broadcast(
    bot: &Bot,
    msg: &Message,
    raw_id: &str,
    supervisor: Arc<BroadcastSupervisor>,
) -> Result<(), anyhow::Error> {
    let id = match Uuid::parse_str(raw_id.trim()) {
        Ok(id) => id,
        Err(_) => {
            bot.send_message(msg.chat.id, "Usage: /stopcast <job id>").await?;
            return Ok(());
        }
    };

    let reply = if supervisor.stop(id).await {
        format!("🛑 Stop signaled for {}.", id)
    } else {
        format!("Broadcast {} is not running.", id)
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn list_broadcasts(
    bot: &Bot,
    msg: &Message,
    store: Arc<SqliteJobStore>,
) -> Result<(), anyhow::Error> {
    match store.list_active().await {
        Ok(jobs) if jobs.is_empty() => {
            bot.send_message(msg.chat.id, "No active broadcasts.").await?;
        }
        Ok(jobs) => {
            let mut response = String::from("📢 Active broadcasts:\n\n");
            for job in jobs {
                response.push_str(&format!(
                    "{} [{}] {} — ✅ {}/{} ❌ {}\n",
                    job.id,
                    job.status.as_str(),
                    job.content_kind.as_str(),
                    job.sent,
                    job.total,
                    job.failed
                ));
            }
            bot.send_message(msg.chat.id, response).await?;
        }
        Err(e) => {
            log::error!("Failed to list broadcasts: {}", e);
            bot.send_message(msg.chat.id, "❌ Database error.").await?;
        }
    }
    Ok(())
}
