use crate::{AUDIT_TARGET, COMMAND_TARGET, CONSOLE_TARGET, Data, ERROR_TARGET, Error};
use poise::{Context, FrameworkError};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Command log file name
pub const COMMAND_LOG_FILE: &str = "commands";
/// Enforcement audit log file name
pub const AUDIT_LOG_FILE: &str = "audit";

/// Initialize console output plus the JSON command and audit logs
///
/// # Errors
/// Returns an error if the log directory cannot be created or the default
/// filter directive does not parse.
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let command_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, COMMAND_LOG_FILE);
    let audit_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, AUDIT_LOG_FILE);

    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    let command_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(command_file)
        .with_filter(filter_fn(|meta| meta.target() != AUDIT_TARGET));

    // Only enforcement records go to the audit file
    let audit_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .json()
        .with_writer(audit_file)
        .with_filter(filter_fn(|meta| meta.target() == AUDIT_TARGET));

    // RUST_LOG wins; otherwise INFO with serenity's gateway chatter muted
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info").add_directive("serenity=error".parse()?),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(command_layer)
        .with(audit_layer)
        .init();

    info!("Logging system initialized");
    Ok(())
}

/// Start time kept in the invocation data
struct CommandStart(Instant);

fn elapsed_ms(start: Option<Instant>) -> u64 {
    start.map_or(0, |start| {
        u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
    })
}

fn guild_label(ctx: Context<'_, Data, Error>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Pre-command hook
pub async fn log_command_start(ctx: Context<'_, Data, Error>) {
    ctx.set_invocation_data(CommandStart(Instant::now())).await;

    let arguments = if ctx.command().parameters.is_empty() {
        String::new()
    } else {
        ctx.invocation_string()
    };

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        arguments = %arguments,
        event = "start",
        "Command execution started"
    );
}

/// Post-command hook
pub async fn log_command_end(ctx: Context<'_, Data, Error>) {
    let start = ctx
        .invocation_data::<CommandStart>()
        .await
        .map(|start| start.0);
    let duration_ms = elapsed_ms(start);

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        duration_ms = duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Framework error hook
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error,
                "Command error"
            );
        }
        FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error_msg = error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string);
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error_msg,
                "Command check failed"
            );
        }
        err => {
            error!(
                target: ERROR_TARGET,
                error = ?err,
                "Other framework error"
            );
        }
    }
}

pub fn log_console(message: &str) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}
