pub mod admin;
pub mod broadcast;
pub mod command;

pub use broadcast::admin_command_handler;
pub use command::command_handler;
