use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::{env, fs};

use tracing_subscriber::EnvFilter;
use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{Event, Intents, Shard, ShardId};
use twilight_http::Client;
use twilight_model::channel::Message;
use twilight_model::gateway::payload::incoming::{Hello, Ready};

use crate::commands::CommandError;
use crate::config::storage::Storage;
use crate::config::{BotConfig, GuildConfigStore};
use crate::settings::permissions::{DiscordPermissions, PermissionChecker};
use crate::settings::roles::{DiscordRoles, RoleResolver};
use crate::settings::SettingsService;
use crate::utils::prelude::*;

mod commands;
mod config;
mod parser;
mod settings;
mod utils;

#[derive(Debug, Clone)]
pub struct Context {
    config: Arc<BotConfig>,
    http: Arc<Client>,
    cache: Arc<InMemoryCache>,
    settings: Arc<SettingsService>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    // Load environment variables from `./.env` file, if any exists.
    dotenvy::dotenv().ok();

    let data_dir = env::var("DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(Storage::DEFAULT_ROOT));

    // Create data folder if it doesn't exist yet.
    fs::create_dir_all(&data_dir).context("Failed to create data folder")?;

    // Create a log file or truncate an existing one.
    let logfile = fs::File::create(data_dir.join("log.log")).context("Failed to create log file")?;

    // Initialize the logger to use `RUST_LOG` environment variable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .with_writer(Mutex::new(logfile))
        .compact()
        .init();

    // Load bot configuration files.
    let config = Arc::new(BotConfig::new(&data_dir)?);

    // Get discord bot token from environment variable.
    let token = env::var("DISCORD_TOKEN").context("Expected a token in the environment")?;

    // Create an http client.
    let http = Arc::new(Client::new(token.to_owned()));

    // Get the application info, such as its id and owner.
    let application = http
        .current_user_application()
        .await?
        .model()
        .await
        .context("Failed to get application info")?;

    // Create a cache, permission calculations need guilds, roles, members and channels.
    let cache = Arc::new(
        InMemoryCache::builder()
            .resource_types(
                ResourceType::GUILD
                    | ResourceType::ROLE
                    | ResourceType::MEMBER
                    | ResourceType::CHANNEL,
            )
            .build(),
    );

    let permissions = DiscordPermissions::new(
        DiscordPermissions::owners_of(&application),
        Arc::clone(&http),
        Arc::clone(&cache),
    );
    let roles = DiscordRoles::new(Arc::clone(&http), Arc::clone(&cache));

    let settings = Arc::new(SettingsService::new(
        Arc::clone(&config) as Arc<dyn GuildConfigStore>,
        Arc::new(permissions) as Arc<dyn PermissionChecker>,
        Arc::new(roles) as Arc<dyn RoleResolver>,
    ));

    let ctx = Context {
        config,
        http,
        cache,
        settings,
    };

    // Start a gateway connection, a single shard is enough for this bot.
    let mut shard = Shard::new(ShardId::ONE, token, intents());

    // Process each event as they come in.
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down by ctrl-c");
                break;
            },
            event = shard.next_event() => event,
        };

        let event = match event {
            Ok(event) => event,
            Err(source) if source.is_fatal() => {
                error!("Fatal shard error: {source}");
                break;
            },
            Err(source) => {
                warn!("Shard error: {source}");
                continue;
            },
        };

        // Update the cache with the event.
        ctx.cache.update(&event);

        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_event(ctx, event).await {
                error!("Error handling event: {e:#}");
            }
        });
    }

    Ok(())
}

/// Main events handler.
async fn handle_event(ctx: Context, event: Event) -> AnyResult<()> {
    match event {
        Event::GatewayHello(h) => handle_hello(&ctx, h).await,
        Event::Ready(r) => handle_ready(&ctx, *r).await,
        Event::MessageCreate(msg) => handle_message_create(&ctx, Arc::new(msg.0)).await,

        // Other events here...
        event => {
            trace!("Event: {:?}", event.kind());

            Ok(())
        },
    }
}

async fn handle_hello(_ctx: &Context, hello: Hello) -> AnyResult<()> {
    info!("Connected with a heartbeat of {}ms", hello.heartbeat_interval);

    Ok(())
}

async fn handle_ready(_ctx: &Context, ready: Ready) -> AnyResult<()> {
    info!("Ready: '{}' in {} guilds", ready.user.name, ready.guilds.len());

    Ok(())
}

async fn handle_message_create(ctx: &Context, msg: Arc<Message>) -> AnyResult<()> {
    // Ignore bot users.
    if msg.author.bot {
        return Ok(());
    }

    match commands::handle::classic_command(ctx, msg).await {
        Ok(()) => Ok(()),

        // Message was not meant for us.
        Err(CommandError::NotPrefixed | CommandError::NotFound(_)) => Ok(()),

        // Already explained to the user.
        Err(CommandError::Settings(e)) if e.is_user_facing() => {
            debug!("Settings command refused: {e}");
            Ok(())
        },
        Err(e @ (CommandError::Usage { .. }
        | CommandError::MissingArgs
        | CommandError::UnexpectedArgs(_)
        | CommandError::ParseError(_))) => {
            debug!("Invalid settings command: {e}");
            Ok(())
        },

        // Log processing errors.
        Err(e) => Err(anyhow::Error::from(e).context("Error processing command")),
    }
}

const fn intents() -> Intents {
    Intents::GUILDS
        .union(Intents::GUILD_MESSAGES)
        .union(Intents::MESSAGE_CONTENT)
        .union(Intents::DIRECT_MESSAGES)
}
