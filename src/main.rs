use std::{env, sync::Arc};

use group_warden::config::CONFIG_FILE;
use group_warden::{BotConfig, Data, Error, commands, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let config = BotConfig::load(CONFIG_FILE).await?;
    let token = env::var("DISCORD_TOKEN").map_err(|_| "DISCORD_TOKEN must be set")?;

    let http = Arc::new(serenity::Http::new(&token));
    let data = Data::load(config, http).await?;
    let sweeper = data.spawn_sweeper();

    let autosave = {
        let data = data.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(data.config.autosave_interval());
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = data.save().await {
                    error!(error = %e, "Autosave failed");
                }
            }
        })
    };

    let framework_data = data.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx).await;
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx).await;
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                // The message handler reads the same data from the type map
                ctx.data
                    .write()
                    .await
                    .insert::<Data>(framework_data.clone());
                Ok(framework_data)
            })
        })
        .build();

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(&token, intents)
        .event_handler(handlers::Handler)
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    info!("Starting bot...");
    tokio::select! {
        result = client.start() => {
            if let Err(err) = result {
                error!(error = %err, "Client stopped");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                error!(error = %err, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
            shard_manager.shutdown_all().await;
        }
    }

    sweeper.shutdown().await;
    autosave.abort();
    data.save().await?;
    info!("State saved, goodbye");
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
