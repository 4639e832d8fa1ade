use std::sync::Arc;

use twilight_cache_inmemory::InMemoryCache;
use twilight_http::Client;
use twilight_mention::parse::ParseMention;
use twilight_model::id::marker::{GuildMarker, RoleMarker};
use twilight_model::id::Id;

use crate::utils::prelude::*;
use crate::utils::ExecModelExt;

/// Role id and name pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildRole {
    pub id: Id<RoleMarker>,
    pub name: String,
}

impl GuildRole {
    pub fn new(id: Id<RoleMarker>, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Access to the roles that currently exist in a guild.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    /// All roles of the guild.
    async fn guild_roles(&self, guild_id: Id<GuildMarker>) -> AnyResult<Vec<GuildRole>>;

    /// Whether the role still exists in the guild.
    async fn role_exists(
        &self,
        guild_id: Id<GuildMarker>,
        role_id: Id<RoleMarker>,
    ) -> AnyResult<bool> {
        let roles = self.guild_roles(guild_id).await?;
        Ok(roles.iter().any(|r| r.id == role_id))
    }

    /// Resolve a role mention, id or name to a role of the guild.
    async fn resolve(
        &self,
        guild_id: Id<GuildMarker>,
        token: &str,
    ) -> AnyResult<Option<Id<RoleMarker>>> {
        let roles = self.guild_roles(guild_id).await?;
        Ok(find_role(&roles, token))
    }
}

/// Find a role by mention, id, exact name or case-insensitive name, in that order.
pub fn find_role(roles: &[GuildRole], token: &str) -> Option<Id<RoleMarker>> {
    let token = token.trim();

    let by_id = Id::<RoleMarker>::parse(token)
        .ok()
        .or_else(|| token.parse().ok().and_then(Id::new_checked));

    if let Some(id) = by_id {
        if roles.iter().any(|r| r.id == id) {
            return Some(id);
        }
    }

    roles
        .iter()
        .find(|r| r.name == token)
        .or_else(|| roles.iter().find(|r| r.name.to_lowercase() == token.to_lowercase()))
        .map(|r| r.id)
}

/// Role lookups backed by the gateway cache, with http requests as a fallback.
#[derive(Debug, Clone)]
pub struct DiscordRoles {
    http: Arc<Client>,
    cache: Arc<InMemoryCache>,
}

impl DiscordRoles {
    pub const fn new(http: Arc<Client>, cache: Arc<InMemoryCache>) -> Self {
        Self { http, cache }
    }

    /// Roles of the guild from the cache, `None` if the guild's roles are not cached.
    fn cached_roles(&self, guild_id: Id<GuildMarker>) -> Option<Vec<GuildRole>> {
        let ids = self.cache.guild_roles(guild_id)?;

        ids.iter()
            .map(|id| {
                self.cache
                    .role(*id)
                    .map(|r| GuildRole::new(*id, r.resource().name.to_owned()))
            })
            .collect()
    }
}

#[async_trait]
impl RoleResolver for DiscordRoles {
    async fn guild_roles(&self, guild_id: Id<GuildMarker>) -> AnyResult<Vec<GuildRole>> {
        if let Some(roles) = self.cached_roles(guild_id) {
            debug!("Using cached roles for guild '{guild_id}'");
            return Ok(roles);
        }

        debug!("Fetching roles with http for guild '{guild_id}'");

        let roles = self
            .http
            .roles(guild_id)
            .send()
            .await
            .context("Failed to fetch guild roles")?;

        Ok(roles
            .into_iter()
            .map(|r| GuildRole::new(r.id, r.name))
            .collect())
    }
}
