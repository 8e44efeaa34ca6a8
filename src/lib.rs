pub mod authz;
pub mod commands;
pub mod config;
pub mod data;
pub mod discord;
pub mod handlers;
pub mod logging;
pub mod moderation;

pub const BOT_NAME: &str = "group_warden";
pub const COMMAND_TARGET: &str = "group_warden::command";
pub const ERROR_TARGET: &str = "group_warden::error";
pub const EVENT_TARGET: &str = "group_warden::handlers";
pub const CONSOLE_TARGET: &str = "group_warden";
pub const AUDIT_TARGET: &str = "group_warden::audit";
pub const SWEEP_TARGET: &str = "group_warden::sweeper";

pub use config::BotConfig;
pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
