use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use derive_more::{Deref, Display};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use twilight_model::id::marker::{GuildMarker, RoleMarker};
use twilight_model::id::Id;

use crate::config::storage::{Directory, Storage};
use crate::utils::prelude::*;

pub mod storage;

/// Global bot settings.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Global classic command prefix.
    #[serde(default)]
    pub prefix: Prefix,
}

/// Guild settings as they are stored on disk.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    /// Guild specific classic command prefix, global prefix is used if `None`.
    #[serde(default)]
    pub prefix: Option<Prefix>,

    /// Role that is allowed to control music playback.
    #[serde(default)]
    pub dj_role_id: Option<Id<RoleMarker>>,

    /// Size of the embeds the bot sends in this guild.
    #[serde(default)]
    pub embed_size: EmbedSize,
}

impl GuildSettings {
    /// Attach the guild id to the settings.
    pub fn into_config(self, guild_id: Id<GuildMarker>) -> GuildConfig {
        GuildConfig {
            guild_id,
            prefix: self.prefix,
            dj_role_id: self.dj_role_id,
            embed_size: self.embed_size,
        }
    }
}

/// Settings record of one guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildConfig {
    pub guild_id: Id<GuildMarker>,
    pub prefix: Option<Prefix>,
    pub dj_role_id: Option<Id<RoleMarker>>,
    pub embed_size: EmbedSize,
}

impl GuildConfig {
    /// Returns a record with default settings.
    pub fn new(guild_id: Id<GuildMarker>) -> Self {
        GuildSettings::default().into_config(guild_id)
    }

    /// Guild prefix if one is set, otherwise `default`.
    pub fn effective_prefix<'a>(&'a self, default: &'a Prefix) -> &'a Prefix {
        self.prefix.as_ref().unwrap_or(default)
    }
}

/// Persistent per-guild settings.
///
/// Every method returns only after the change has been committed.
#[async_trait]
pub trait GuildConfigStore: Send + Sync {
    /// The global classic command prefix.
    async fn default_prefix(&self) -> AnyResult<Prefix>;

    /// Fetch the guild's settings.
    /// A record with default settings is created if the guild has none yet.
    async fn get(&self, guild_id: Id<GuildMarker>) -> AnyResult<GuildConfig>;

    /// Set or clear the guild prefix.
    async fn set_prefix(&self, guild_id: Id<GuildMarker>, prefix: Option<Prefix>) -> AnyResult<()>;

    /// Set or clear the DJ role.
    async fn set_dj_role_id(
        &self,
        guild_id: Id<GuildMarker>,
        role_id: Option<Id<RoleMarker>>,
    ) -> AnyResult<()>;

    /// Set the embed size.
    async fn set_embed_size(&self, guild_id: Id<GuildMarker>, size: EmbedSize) -> AnyResult<()>;

    /// Clear the DJ role only while it is still `role_id`.
    /// Returns whether it was cleared.
    async fn clear_dj_role_if(
        &self,
        guild_id: Id<GuildMarker>,
        role_id: Id<RoleMarker>,
    ) -> AnyResult<bool>;
}

/// File-backed bot configuration.
#[derive(Debug)]
pub struct BotConfig {
    storage: Storage,
}

impl BotConfig {
    /// Setup a new configuration under the `root` data directory.
    pub fn new(root: impl Into<PathBuf>) -> AnyResult<Self> {
        let mut storage = Storage::new(root);

        storage.bind::<GlobalSettings>("bot")?;
        storage.bind::<GuildSettings>("guild")?;

        Ok(Self {
            storage: storage.validated()?,
        })
    }

    /// Return general bot configuration directory.
    pub fn global(&self) -> AnyResult<Global> {
        Ok(Global::new(self.storage.global()?))
    }

    /// Return guild configuration directory.
    pub fn guild(&self, guild_id: Id<GuildMarker>) -> AnyResult<Guild> {
        Ok(Guild::new(self.storage.by_guild_id(guild_id)?, guild_id))
    }

    /// Modify guild settings with a function.
    /// This method will save the changes to file and then returns
    /// with the return type of the closure.
    pub fn guild_settings_with<R>(
        &self,
        guild_id: Id<GuildMarker>,
        f: impl FnOnce(&mut GuildSettings) -> AnyResult<R>,
    ) -> AnyResult<R> {
        self.storage.by_guild_id(guild_id)?.save_with(f)
    }

    /// Return classic command prefix, either global prefix or a guild specific one.
    pub fn classic_prefix(&self, guild_id: Option<Id<GuildMarker>>) -> AnyResult<Prefix> {
        let global = self.global()?.classic_prefix()?;

        let Some(guild_id) = guild_id else {
            return Ok(global);
        };

        match self.guild(guild_id).and_then(|mut g| g.classic_prefix()) {
            Ok(prefix) => Ok(prefix.unwrap_or(global)),
            Err(e) => {
                debug!("Using global prefix for guild '{guild_id}': {e:#}");
                Ok(global)
            },
        }
    }
}

#[async_trait]
impl GuildConfigStore for BotConfig {
    async fn default_prefix(&self) -> AnyResult<Prefix> {
        self.global()?.classic_prefix()
    }

    async fn get(&self, guild_id: Id<GuildMarker>) -> AnyResult<GuildConfig> {
        let settings = self.guild(guild_id)?.settings()?.clone();
        Ok(settings.into_config(guild_id))
    }

    async fn set_prefix(&self, guild_id: Id<GuildMarker>, prefix: Option<Prefix>) -> AnyResult<()> {
        debug!("Setting prefix of guild '{guild_id}' to {prefix:?}");
        self.guild_settings_with(guild_id, |s| {
            s.prefix = prefix;
            Ok(())
        })
    }

    async fn set_dj_role_id(
        &self,
        guild_id: Id<GuildMarker>,
        role_id: Option<Id<RoleMarker>>,
    ) -> AnyResult<()> {
        debug!("Setting DJ role of guild '{guild_id}' to {role_id:?}");
        self.guild_settings_with(guild_id, |s| {
            s.dj_role_id = role_id;
            Ok(())
        })
    }

    async fn set_embed_size(&self, guild_id: Id<GuildMarker>, size: EmbedSize) -> AnyResult<()> {
        debug!("Setting embed size of guild '{guild_id}' to {size:?}");
        self.guild_settings_with(guild_id, |s| {
            s.embed_size = size;
            Ok(())
        })
    }

    async fn clear_dj_role_if(
        &self,
        guild_id: Id<GuildMarker>,
        role_id: Id<RoleMarker>,
    ) -> AnyResult<bool> {
        self.guild_settings_with(guild_id, |s| {
            if s.dj_role_id != Some(role_id) {
                return Ok(false);
            }

            debug!("Clearing DJ role '{role_id}' of guild '{guild_id}'");
            s.dj_role_id = None;
            Ok(true)
        })
    }
}

/// Global data entry guard.
#[derive(Debug)]
pub struct Global<'a> {
    dir: Directory<'a>,
}

impl<'a> Global<'a> {
    /// Create a global access with a directory.
    pub const fn new(dir: Directory<'a>) -> Self {
        Self { dir }
    }

    /// Get global bot settings.
    pub fn bot_settings(&mut self) -> AnyResult<&GlobalSettings> {
        self.dir
            .load_or_default()
            .context("Failed to load bot settings")
    }

    /// Get global classic command prefix.
    pub fn classic_prefix(&mut self) -> AnyResult<Prefix> {
        Ok(self.bot_settings()?.prefix.clone())
    }
}

/// Guild data entry guard.
#[derive(Debug)]
pub struct Guild<'a> {
    dir: Directory<'a>,
    guild_id: Id<GuildMarker>,
}

impl<'a> Guild<'a> {
    /// Create a guild access with a directory and guild id.
    pub const fn new(dir: Directory<'a>, guild_id: Id<GuildMarker>) -> Self {
        Self { dir, guild_id }
    }

    /// Get guild settings, creates defaults on first access.
    pub fn settings(&mut self) -> AnyResult<&GuildSettings> {
        let guild_id = self.guild_id;
        self.dir
            .load_or_default()
            .with_context(|| format!("Failed to load settings for guild '{guild_id}'"))
    }

    /// Get guild classic command prefix, if set.
    pub fn classic_prefix(&mut self) -> AnyResult<Option<Prefix>> {
        Ok(self.settings()?.prefix.clone())
    }
}

/// Bot classic command prefix.
#[derive(Debug, Clone, PartialEq, Eq, Deref, Display, Serialize, Deserialize)]
pub struct Prefix(String);

impl Prefix {
    /// Longest accepted prefix, in characters.
    pub const MAX_LEN: usize = 15;

    /// Validate user input as a prefix.
    ///
    /// Trailing whitespace is kept, so `"music "` makes `music help` work.
    pub fn parse(input: &str) -> Result<Self, PrefixError> {
        if input.trim().is_empty() {
            return Err(PrefixError::Empty);
        }

        if input.starts_with(char::is_whitespace) {
            return Err(PrefixError::LeadingWhitespace);
        }

        if input.chars().count() > Self::MAX_LEN {
            return Err(PrefixError::TooLong(Self::MAX_LEN));
        }

        if input.contains('`') {
            return Err(PrefixError::Backtick);
        }

        if input.contains(['\n', '\r']) {
            return Err(PrefixError::LineBreak);
        }

        Ok(Self(input.to_string()))
    }
}

impl Default for Prefix {
    fn default() -> Self {
        Self(String::from("!"))
    }
}

impl AsRef<str> for Prefix {
    fn as_ref(&self) -> &str {
        self
    }
}

/// Reasons why a prefix is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefixError {
    #[error("The prefix can not be empty.")]
    Empty,

    #[error("The prefix can not start with whitespace.")]
    LeadingWhitespace,

    #[error("The prefix can not be longer than {0} characters.")]
    TooLong(usize),

    #[error("The prefix can not contain backticks.")]
    Backtick,

    #[error("The prefix can not contain line breaks.")]
    LineBreak,
}

/// Size of the embeds sent by the bot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedSize {
    Small,
    Medium,
    #[default]
    Large,
}

impl EmbedSize {
    pub const ALL: [Self; 3] = [Self::Small, Self::Medium, Self::Large];

    /// Lowercase name, as accepted by the parser.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl fmt::Display for EmbedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Small => "Small",
            Self::Medium => "Medium",
            Self::Large => "Large",
        };
        f.write_str(text)
    }
}

impl FromStr for EmbedSize {
    type Err = EmbedSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|size| size.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EmbedSizeError(s.to_string()))
    }
}

/// Input did not name an embed size.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a valid embed size, expected one of: 'small', 'medium', 'large'.")]
pub struct EmbedSizeError(pub String);
