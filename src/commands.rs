use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
pub enum Command {
    #[command(description = "display this text.")]
    Help,
    #[command(description = "start the bot.")]
    Start,
}

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase")]
pub enum AdminCommand {
    #[command(description = "send a text broadcast to all users: /broadcast <text>")]
    Broadcast { text: String },
    #[command(description = "stop a running broadcast: /stopcast <job id>")]
    StopCast { id: String },
    #[command(description = "stop every running broadcast.")]
    StopAllCasts,
    #[command(description = "list active broadcasts with progress.")]
    Casts,
}
