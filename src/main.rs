use std::fs::File;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, level_filters::LevelFilter, warn};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use database::PgDatabase;
use notify::DiscordNotifier;
use poise::{serenity_prelude as serenity, CreateReply};

use commands::{manager_commands::ManagerCommands, user_commands::UserCommands, CommandsContainer};

use crate::config::BotConfig;
use crate::log::discord_log_error;
use crate::scheduler::Scheduler;

/// All the commands that the bot can run.
///
/// Additionally, it contains the `CommandsContainer` trait that groups all the commands together
/// as well as checks used by various commands.
mod commands;
/// Process configuration read from the environment.
mod config;
/// Entering and ending reaction contests.
mod contest;
/// Traits and types used for interacting with the database.
mod database;
/// Gateway events: announcement buttons and contest reactions.
mod event_handler;
/// Liveness endpoint.
mod health;
/// The event state machine.
mod lifecycle;
/// Contains functions for logging.
mod log;
/// Outbound messages, roles and member lookups.
mod notify;
/// Registering for and withdrawing from events.
mod registry;
/// The reconciliation loop that drives events through their lifecycle.
mod scheduler;
#[cfg(test)]
mod testing;

mod utils;

/// Stores data used by the bot.
///
/// Accessible by all bot commands through Context.
#[derive(Debug, Clone)]
pub struct Data<DB, N> {
    database: DB,
    notifier: N,
    config: BotConfig,
}

impl<DB, N> Data<DB, N> {
    /// Create a new data struct with a given Database and Notifier.
    fn new(database: DB, notifier: N, config: BotConfig) -> Self {
        Self {
            database,
            notifier,
            config,
        }
    }
}

/// Convenience type for the bot's data with generics filled in.
pub type BotData = Data<PgDatabase, DiscordNotifier>;

/// A thread-safe Error type used by the bot.
pub type BotError = anyhow::Error;

/// A context that gives the bot information about the action that invoked it.
///
/// It also includes other useful data that the bot uses such as the database.
/// You can access the data in commands by using ``ctx.data()``.
pub type BotContext<'a> = poise::Context<'a, BotData, BotError>;

#[tokio::main]
async fn main() {
    if let Err(e) = setup_tracing() {
        panic!("Error trying to setup tracing: {}", e);
    }

    if let Err(e) = run().await {
        panic!("Error trying to run the bot: {}", e);
    }
}

/// Reports a framework error to the user and to the guild's log channel.
async fn on_error(error: poise::FrameworkError<'_, BotData, BotError>) {
    let error_msg = match error {
        poise::FrameworkError::CommandCheckFailed { ref error, .. } => match error {
            Some(error) => error.to_string(),
            None => return,
        },
        poise::FrameworkError::Setup { ref error, .. } => error.to_string(),
        poise::FrameworkError::EventHandler { ref error, .. } => {
            error!("Error in event handler: {:?}", error);
            return;
        }
        poise::FrameworkError::Command { ref error, .. } => error.to_string(),
        poise::FrameworkError::ArgumentParse { ref error, .. } => error.to_string(),
        poise::FrameworkError::UnknownCommand { .. }
        | poise::FrameworkError::GuildOnly { .. }
        | poise::FrameworkError::DmOnly { .. }
        | poise::FrameworkError::NsfwOnly { .. }
        | poise::FrameworkError::NotAnOwner { .. } => return,
        _ => "No cause available for this error type.".to_string(),
    };
    error!("Error in command: {:?}", error);

    let Some(ctx) = error.ctx() else {
        error!("No context in this error");
        return;
    };
    if let Err(e) = ctx
        .send(
            CreateReply::default()
                .content("Something went wrong. Please let the bot maintainers know if the issue persists.")
                .ephemeral(true),
        )
        .await
    {
        error!("Error sending generic error message to user: {}", e);
    }
    if ctx.guild_id().is_none() {
        warn!("No guild id in this error context. Cannot send error message to log channel.");
        return;
    }

    let user_field = format!("<@{}>", ctx.author().id);
    let command_field = format!("/{}", ctx.command().qualified_name);
    let fields = vec![
        ("Cause", error_msg.as_str(), false),
        ("User", user_field.as_str(), false),
        ("Command", command_field.as_str(), false),
    ];
    discord_log_error(ctx, &error.to_string(), fields)
        .await
        .unwrap_or_else(|e| error!("Error sending error message to log channel: {:?}", e));
}

/// The main function that runs the bot.
async fn run() -> Result<(), BotError> {
    let setup_span = info_span!("bot_setup");
    let _guard = setup_span.enter();
    // Load the .env file only in the development environment (bypassed with the --release flag)
    #[cfg(debug_assertions)]
    dotenv::dotenv().ok();

    let config = BotConfig::from_env()?;
    info!("Successfully loaded the configuration: {:?}", config);

    let pg_database = PgDatabase::connect(&config.database_url).await?;
    pg_database.migrate().await?;
    info!("Database migrations applied");

    let shutdown = CancellationToken::new();
    let health_port = config.health_port;
    let health_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_port, health_shutdown).await {
            error!("Liveness endpoint stopped: {}", e);
        }
    });

    let commands: Vec<_> = vec![ManagerCommands::get_all(), UserCommands::get_all()]
        .into_iter()
        .flatten()
        .collect();
    commands
        .iter()
        .for_each(|c| info!("Registered command: {}", c.name));

    let intents = serenity::GatewayIntents::non_privileged();
    let discord_token = config.discord_token.clone();
    let scheduler_shutdown = shutdown.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands,
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Ready as {}", ready.user.name);

                let notifier = DiscordNotifier::new(Arc::clone(&ctx.http));
                let scheduler = Scheduler::new(
                    pg_database.clone(),
                    notifier.clone(),
                    config.tick_interval,
                );
                tokio::spawn(scheduler.run(scheduler_shutdown));

                Ok(Data::new(pg_database, notifier, config))
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(discord_token, intents)
        .framework(framework)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for the shutdown signal: {}", e);
            return;
        }
        info!("Shutting down");
        shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    client.start().await?;

    Ok(())
}

/// Sets up the tracing subscriber for the bot.
fn setup_tracing() -> Result<(), BotError> {
    if cfg!(debug_assertions) {
        let filter = EnvFilter::from_default_env()
            .add_directive("none".parse()?)
            .add_directive("event_bot=info".parse()?);

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::NONE)
            .pretty()
            .init();

        return Ok(());
    }

    let log_file = File::create("debug.log")?;

    // Only errors are logged in production
    tracing_subscriber::fmt::fmt()
        .with_span_events(FmtSpan::NONE)
        .with_max_level(LevelFilter::ERROR)
        .with_writer(log_file)
        .pretty()
        .init();

    Ok(())
}
