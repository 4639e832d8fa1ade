use std::collections::HashSet;
use std::sync::Arc;

use twilight_cache_inmemory::InMemoryCache;
use twilight_http::Client;
use twilight_model::guild::Permissions;
use twilight_model::id::marker::{GuildMarker, UserMarker};
use twilight_model::id::Id;
use twilight_model::oauth::Application;
use twilight_util::permission_calculator::PermissionCalculator;

use crate::utils::prelude::*;
use crate::utils::ExecModelExt;

/// Holding any of these is enough to change guild settings.
pub const MODERATOR_PERMISSIONS: Permissions = Permissions::MANAGE_CHANNELS
    .union(Permissions::MANAGE_ROLES)
    .union(Permissions::MANAGE_GUILD)
    .union(Permissions::KICK_MEMBERS)
    .union(Permissions::BAN_MEMBERS)
    .union(Permissions::ADMINISTRATOR);

/// Returns `true` if `permissions` contains at least one moderator permission.
pub const fn is_moderator(permissions: Permissions) -> bool {
    permissions.intersects(MODERATOR_PERMISSIONS)
}

/// Decides who may change guild settings.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Whether the user is one of the bot owners.
    fn is_bot_owner(&self, user_id: Id<UserMarker>) -> bool;

    /// Whether the user owns the guild.
    async fn is_guild_owner(
        &self,
        user_id: Id<UserMarker>,
        guild_id: Id<GuildMarker>,
    ) -> AnyResult<bool>;

    /// Guild-wide permissions of the member.
    async fn member_permissions(
        &self,
        user_id: Id<UserMarker>,
        guild_id: Id<GuildMarker>,
    ) -> AnyResult<Permissions>;

    /// Whether the user may change the guild's settings.
    ///
    /// Bot owner, then guild owner, then moderator permissions. The first check that
    /// passes wins and the rest are not evaluated.
    async fn is_authorized_write(
        &self,
        user_id: Id<UserMarker>,
        guild_id: Id<GuildMarker>,
    ) -> AnyResult<bool> {
        if self.is_bot_owner(user_id) {
            trace!("'{user_id}' is a bot owner");
            return Ok(true);
        }

        if self.is_guild_owner(user_id, guild_id).await? {
            trace!("'{user_id}' owns guild '{guild_id}'");
            return Ok(true);
        }

        let permissions = self.member_permissions(user_id, guild_id).await?;
        trace!("'{user_id}' has permissions {permissions:?} in guild '{guild_id}'");

        Ok(is_moderator(permissions))
    }
}

/// Permission checks backed by the gateway cache, with http requests as a fallback.
#[derive(Debug, Clone)]
pub struct DiscordPermissions {
    owners: HashSet<Id<UserMarker>>,
    http: Arc<Client>,
    cache: Arc<InMemoryCache>,
}

impl DiscordPermissions {
    pub fn new(
        owners: impl IntoIterator<Item = Id<UserMarker>>,
        http: Arc<Client>,
        cache: Arc<InMemoryCache>,
    ) -> Self {
        Self {
            owners: owners.into_iter().collect(),
            http,
            cache,
        }
    }

    /// Bot owners from the application info, the team owner if the application belongs to a team.
    pub fn owners_of(application: &Application) -> Vec<Id<UserMarker>> {
        match (&application.team, &application.owner) {
            (Some(team), _) => vec![team.owner_user_id],
            (None, Some(owner)) => vec![owner.id],
            (None, None) => {
                warn!("No owners found for application '{}'", application.id);
                Vec::new()
            },
        }
    }
}

#[async_trait]
impl PermissionChecker for DiscordPermissions {
    fn is_bot_owner(&self, user_id: Id<UserMarker>) -> bool {
        self.owners.contains(&user_id)
    }

    async fn is_guild_owner(
        &self,
        user_id: Id<UserMarker>,
        guild_id: Id<GuildMarker>,
    ) -> AnyResult<bool> {
        let cached = self.cache.guild(guild_id).map(|g| g.owner_id());

        let owner_id = match cached {
            Some(owner_id) => owner_id,
            None => {
                debug!("Fetching guild '{guild_id}' with http");
                self.http.guild(guild_id).send().await?.owner_id
            },
        };

        Ok(owner_id == user_id)
    }

    async fn member_permissions(
        &self,
        user_id: Id<UserMarker>,
        guild_id: Id<GuildMarker>,
    ) -> AnyResult<Permissions> {
        match self.cache.permissions().root(user_id, guild_id) {
            Ok(permissions) => {
                debug!("Using cached permissions for '{user_id}'");
                return Ok(permissions);
            },
            Err(e) => debug!("Fetching permissions with http for '{user_id}': {e}"),
        }

        // `@everyone` role id is the same as the guild's id.
        let everyone_id = guild_id.cast();

        let member = self
            .http
            .guild_member(guild_id, user_id)
            .send()
            .await
            .context("Failed to fetch member")?;
        let roles = self
            .http
            .roles(guild_id)
            .send()
            .await
            .context("Failed to fetch guild roles")?;

        let everyone = roles
            .iter()
            .find(|r| r.id == everyone_id)
            .map_or_else(Permissions::empty, |r| r.permissions);

        let member_roles: Vec<_> = roles
            .iter()
            .filter(|r| member.roles.contains(&r.id))
            .map(|r| (r.id, r.permissions))
            .collect();

        Ok(PermissionCalculator::new(guild_id, user_id, everyone, &member_roles).root())
    }
}
