//! Classic text commands for guild settings.
//!
//! ```text
//! prefix                  show the prefix
//! prefix set <value>      set a guild prefix
//! prefix reset            go back to the global prefix
//! dj                      show the DJ role
//! dj set <role>           set the DJ role by mention, id or name
//! dj reset                clear the DJ role
//! embed-size              show the embed size
//! embed-size set <size>   small, medium or large
//! embed-size reset        go back to large
//! ```

use std::mem;

use indoc::formatdoc;
use thiserror::Error;
use twilight_model::channel::message::Embed;
use twilight_model::id::marker::GuildMarker;
use twilight_model::id::Id;
use twilight_util::builder::embed::EmbedBuilder;

use crate::config::{EmbedSize, Prefix};
use crate::settings::roles::RoleResolver;
use crate::settings::{Operation, Reply, SettingsError, Tone};
use crate::utils::consts;
use crate::{parser, utils};

pub mod handle;

#[derive(Debug, Error)]
pub enum CommandError {
    /// A command prefix is needed.
    #[error("Message did not start with a command prefix")]
    NotPrefixed,

    /// A command does not exist.
    #[error("Command not found: {0}")]
    NotFound(String),

    /// The sender must provide some arguments.
    #[error("Expected arguments missing")]
    MissingArgs,

    /// Some arguments are wrong, invalid or unexpected.
    #[error("{0}")]
    UnexpectedArgs(String),

    /// Error while parsing command or argument.
    #[error("{0}")]
    ParseError(String),

    /// Argument error of a known command group.
    #[error("{error}")]
    Usage {
        group: Group,
        error: Box<CommandError>,
    },

    /// The settings operation failed.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Other errors that are or can be converted to `anyhow::Error`.
    #[error(transparent)]
    Other(#[from] anyhow::Error), // Source and Display delegate to `anyhow::Error`
}

impl CommandError {
    /// Attach the command group, so a usage hint can be shown.
    fn in_group(self, group: Group) -> Self {
        match self {
            e @ (Self::MissingArgs | Self::UnexpectedArgs(_) | Self::ParseError(_)) => {
                Self::Usage {
                    group,
                    error: Box::new(e),
                }
            },
            e => e,
        }
    }
}

impl PartialEq for CommandError {
    fn eq(&self, other: &Self) -> bool {
        mem::discriminant(self) == mem::discriminant(other) // Close enough.
    }
}

macro_rules! impl_into_command_error {
    ($out:ident; $t:ty) => {
        impl From<$t> for CommandError {
            fn from(other: $t) -> Self {
                Self::$out(other.into())
            }
        }
    };
}

impl_into_command_error!(Other; twilight_http::Error);
impl_into_command_error!(Other; twilight_http::response::DeserializeBodyError);
impl_into_command_error!(Other; twilight_validate::message::MessageValidationError);

/// Settings command groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Prefix,
    Dj,
    EmbedSize,
}

impl Group {
    /// Lookup a group by command name or alias, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "prefix" => Some(Self::Prefix),
            "dj" => Some(Self::Dj),
            "embed-size" | "embed_size" | "embedsize" | "es" => Some(Self::EmbedSize),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Prefix => "prefix",
            Self::Dj => "dj",
            Self::EmbedSize => "embed-size",
        }
    }

    /// Usage hint of the group with the prefix used in the guild.
    pub fn usage(self, prefix: &str) -> String {
        let name = self.name();
        match self {
            Self::Prefix => formatdoc!(
                "**Usage:**
                `{prefix}{name}` to show the prefix.
                `{prefix}{name} set <value>` to set a new prefix, quote it to include spaces.
                `{prefix}{name} reset` to use the default prefix again.
                The prefix can be at most {max} characters long.",
                max = Prefix::MAX_LEN,
                prefix = prefix,
                name = name,
            ),
            Self::Dj => formatdoc!(
                "**Usage:**
                `{prefix}{name}` to show the DJ role.
                `{prefix}{name} set <role>` to set the DJ role by mention, id or name.
                `{prefix}{name} reset` to clear the DJ role.",
                prefix = prefix,
                name = name,
            ),
            Self::EmbedSize => formatdoc!(
                "**Usage:**
                `{prefix}{name}` to show the embed size.
                `{prefix}{name} set <size>` to set the embed size, one of: {sizes}.
                `{prefix}{name} reset` to use the `Large` size again.",
                sizes = utils::nice_list(EmbedSize::ALL.map(EmbedSize::name)),
                prefix = prefix,
                name = name,
            ),
        }
    }
}

/// A parsed command, the DJ role still needs to be looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    Ready(Operation),
    SetDjRole(&'a str),
}

impl Request<'_> {
    /// Resolve any role argument in the guild.
    pub async fn into_operation(
        self,
        guild_id: Option<Id<GuildMarker>>,
        roles: &dyn RoleResolver,
    ) -> Result<Operation, CommandError> {
        let token = match self {
            Self::Ready(op) => return Ok(op),
            Self::SetDjRole(token) => token,
        };

        let Some(guild_id) = guild_id else {
            return Err(SettingsError::Scope.into());
        };

        match roles.resolve(guild_id, token).await? {
            Some(role_id) => Ok(Operation::SetDjRole(role_id)),
            None => Err(CommandError::UnexpectedArgs(format!(
                "Role '{}' not found.",
                utils::escape_discord_chars(token)
            ))
            .in_group(Group::Dj)),
        }
    }
}

/// Parse unprefixed message content into a command request.
pub fn parse(unprefixed: &str) -> Result<(Group, Request), CommandError> {
    let (name, rest) = parser::split_once_whitespace(unprefixed.trim_start());

    let Some(group) = Group::from_name(name) else {
        return Err(CommandError::NotFound(name.to_string()));
    };

    let request = parse_group(group, rest).map_err(|e| e.in_group(group))?;

    Ok((group, request))
}

fn parse_group(group: Group, rest: Option<&str>) -> Result<Request, CommandError> {
    let (sub, rest) = parser::split_once_whitespace(rest.map_or("", str::trim_start));

    match (group, sub.to_lowercase().as_str()) {
        (_, "") => Ok(Request::Ready(match group {
            Group::Prefix => Operation::ShowPrefix,
            Group::Dj => Operation::ShowDjRole,
            Group::EmbedSize => Operation::ShowEmbedSize,
        })),
        (_, "reset") => {
            parser::ensure_rest_is_empty(rest)?;
            Ok(Request::Ready(match group {
                Group::Prefix => Operation::ResetPrefix,
                Group::Dj => Operation::ResetDjRole,
                Group::EmbedSize => Operation::ResetEmbedSize,
            }))
        },
        (Group::Prefix, "set") => {
            let (value, rest) = parser::maybe_quoted_arg(rest.unwrap_or(""))?;
            parser::ensure_rest_is_empty(rest)?;

            let prefix = Prefix::parse(value)
                .map_err(|e| CommandError::ParseError(e.to_string()))?;

            Ok(Request::Ready(Operation::SetPrefix(prefix)))
        },
        (Group::Dj, "set") => match rest.map(str::trim) {
            Some(token) if !token.is_empty() => Ok(Request::SetDjRole(token)),
            _ => Err(CommandError::MissingArgs),
        },
        (Group::EmbedSize, "set") => {
            let (value, rest) = parser::maybe_quoted_arg(rest.unwrap_or(""))?;
            parser::ensure_rest_is_empty(rest)?;

            let size = value
                .parse::<EmbedSize>()
                .map_err(|e| CommandError::ParseError(e.to_string()))?;

            Ok(Request::Ready(Operation::SetEmbedSize(size)))
        },
        (_, other) => Err(CommandError::UnexpectedArgs(format!(
            "Unknown subcommand '{}'.",
            utils::escape_discord_chars(other)
        ))),
    }
}

/// Embed for a successful reply.
pub fn reply_embed(reply: &Reply) -> Embed {
    let colour = match reply.tone {
        Tone::Info => consts::COLOUR_MAIN,
        Tone::Success => consts::COLOUR_GREEN,
    };

    EmbedBuilder::new()
        .color(colour)
        .description(&reply.description)
        .build()
}

/// Embed for a failed command, `None` if the message was not meant for us.
pub fn error_embed(error: &CommandError, prefix: &str) -> Option<Embed> {
    let description = match error {
        CommandError::NotPrefixed | CommandError::NotFound(_) => return None,
        CommandError::Usage { group, error } => {
            format!("{error}\n\n{}", group.usage(prefix))
        },
        CommandError::Settings(e) if e.is_user_facing() => e.to_string(),
        CommandError::MissingArgs
        | CommandError::UnexpectedArgs(_)
        | CommandError::ParseError(_) => error.to_string(),
        CommandError::Settings(_) | CommandError::Other(_) => {
            String::from("Something went wrong while running the command, please try again later.")
        },
    };

    Some(
        EmbedBuilder::new()
            .color(consts::COLOUR_RED)
            .description(description)
            .build(),
    )
}
