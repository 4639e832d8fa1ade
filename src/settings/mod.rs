//! Per-guild settings: prefix, DJ role and embed size.
//!
//! Reads are open to anyone in the guild, every write goes through the permission gate first.
//! A DJ role that no longer exists is cleared the next time it is read.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use twilight_mention::Mention;
use twilight_model::id::marker::{GuildMarker, RoleMarker, UserMarker};
use twilight_model::id::Id;

use crate::config::{EmbedSize, GuildConfigStore, Prefix};
use crate::settings::permissions::PermissionChecker;
use crate::settings::roles::RoleResolver;
use crate::utils::prelude::*;

pub mod permissions;
pub mod roles;

/// Who invoked an operation and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    /// `None` when invoked outside of a guild, eg. in DMs.
    pub guild_id: Option<Id<GuildMarker>>,
    pub actor: Id<UserMarker>,
}

impl Invocation {
    pub const fn new(guild_id: Option<Id<GuildMarker>>, actor: Id<UserMarker>) -> Self {
        Self { guild_id, actor }
    }
}

/// Setting groups, each with its own permission message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    Prefix,
    DjRole,
    EmbedSize,
}

impl Setting {
    const fn denied(self) -> &'static str {
        match self {
            Self::Prefix => "You don't have permission to change this server's prefix.",
            Self::DjRole => "You don't have permission to change this server's DJ role.",
            Self::EmbedSize => "You don't have permission to change this server's embed size.",
        }
    }
}

/// A parsed settings command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ShowPrefix,
    SetPrefix(Prefix),
    ResetPrefix,
    ShowDjRole,
    SetDjRole(Id<RoleMarker>),
    ResetDjRole,
    ShowEmbedSize,
    SetEmbedSize(EmbedSize),
    ResetEmbedSize,
}

impl Operation {
    /// Setting group the operation belongs to.
    pub const fn setting(&self) -> Setting {
        match self {
            Self::ShowPrefix | Self::SetPrefix(_) | Self::ResetPrefix => Setting::Prefix,
            Self::ShowDjRole | Self::SetDjRole(_) | Self::ResetDjRole => Setting::DjRole,
            Self::ShowEmbedSize | Self::SetEmbedSize(_) | Self::ResetEmbedSize => {
                Setting::EmbedSize
            },
        }
    }

    /// Whether the operation changes settings.
    pub const fn is_write(&self) -> bool {
        !matches!(
            self,
            Self::ShowPrefix | Self::ShowDjRole | Self::ShowEmbedSize
        )
    }
}

/// How a reply should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
}

/// Successful result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub tone: Tone,
    pub description: String,
}

impl Reply {
    fn info(description: impl Into<String>) -> Self {
        Self {
            tone: Tone::Info,
            description: description.into(),
        }
    }

    fn success(description: impl Into<String>) -> Self {
        Self {
            tone: Tone::Success,
            description: description.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings only exist in guilds.
    #[error("This command can only be used in a server.")]
    Scope,

    /// The actor may not change this setting.
    #[error("{0}")]
    Permission(&'static str),

    /// The setting has no value to show or reset.
    #[error("{0}")]
    NotConfigured(&'static str),

    /// The stored value pointed to something that is gone, it has been cleared.
    #[error("{0}")]
    StaleReference(&'static str),

    /// Store or platform lookups failed.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl SettingsError {
    /// Whether the message is meant to be shown to the user as is.
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Unexpected(_))
    }
}

const NO_PREFIX: &str = "This server has not set a custom prefix.";
const NO_DJ_ROLE: &str = "This server has not set a DJ role.";
const DJ_ROLE_DELETED: &str = "This server's DJ role was deleted, please set a new one.";

/// Guild settings operations.
#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn GuildConfigStore>,
    permissions: Arc<dyn PermissionChecker>,
    roles: Arc<dyn RoleResolver>,
}

impl fmt::Debug for SettingsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsService").finish_non_exhaustive()
    }
}

impl SettingsService {
    pub fn new(
        store: Arc<dyn GuildConfigStore>,
        permissions: Arc<dyn PermissionChecker>,
        roles: Arc<dyn RoleResolver>,
    ) -> Self {
        Self {
            store,
            permissions,
            roles,
        }
    }

    /// Role lookups of the service.
    pub fn roles(&self) -> &dyn RoleResolver {
        self.roles.as_ref()
    }

    /// Run an operation for the invoker.
    pub async fn execute(&self, inv: &Invocation, op: Operation) -> Result<Reply, SettingsError> {
        let Some(guild_id) = inv.guild_id else {
            return Err(SettingsError::Scope);
        };

        if op.is_write() {
            self.authorize(inv.actor, guild_id, op.setting()).await?;
        }

        debug!("Running {op:?} in guild '{guild_id}' for '{}'", inv.actor);

        match op {
            Operation::ShowPrefix => self.show_prefix(guild_id).await,
            Operation::SetPrefix(prefix) => self.set_prefix(guild_id, prefix).await,
            Operation::ResetPrefix => self.reset_prefix(guild_id).await,
            Operation::ShowDjRole => self.show_dj_role(guild_id).await,
            Operation::SetDjRole(role_id) => self.set_dj_role(guild_id, role_id).await,
            Operation::ResetDjRole => self.reset_dj_role(guild_id).await,
            Operation::ShowEmbedSize => self.show_embed_size(guild_id).await,
            Operation::SetEmbedSize(size) => self.set_embed_size(guild_id, size).await,
            Operation::ResetEmbedSize => self.reset_embed_size(guild_id).await,
        }
    }

    async fn authorize(
        &self,
        actor: Id<UserMarker>,
        guild_id: Id<GuildMarker>,
        setting: Setting,
    ) -> Result<(), SettingsError> {
        if self.permissions.is_authorized_write(actor, guild_id).await? {
            Ok(())
        } else {
            info!("Denied {setting:?} change in guild '{guild_id}' for '{actor}'");
            Err(SettingsError::Permission(setting.denied()))
        }
    }

    async fn show_prefix(&self, guild_id: Id<GuildMarker>) -> Result<Reply, SettingsError> {
        let config = self.store.get(guild_id).await?;
        let global = self.store.default_prefix().await?;
        let prefix = config.effective_prefix(&global);

        Ok(Reply::info(format!("My prefix in this server is `{prefix}`")))
    }

    async fn set_prefix(
        &self,
        guild_id: Id<GuildMarker>,
        prefix: Prefix,
    ) -> Result<Reply, SettingsError> {
        let text = format!("Set this server's prefix to `{prefix}`");
        self.store.set_prefix(guild_id, Some(prefix)).await?;

        Ok(Reply::success(text))
    }

    async fn reset_prefix(&self, guild_id: Id<GuildMarker>) -> Result<Reply, SettingsError> {
        let config = self.store.get(guild_id).await?;
        if config.prefix.is_none() {
            return Err(SettingsError::NotConfigured(NO_PREFIX));
        }

        self.store.set_prefix(guild_id, None).await?;
        let global = self.store.default_prefix().await?;

        Ok(Reply::success(format!(
            "Reset this server's prefix to `{global}`"
        )))
    }

    async fn show_dj_role(&self, guild_id: Id<GuildMarker>) -> Result<Reply, SettingsError> {
        let config = self.store.get(guild_id).await?;
        let Some(role_id) = config.dj_role_id else {
            return Err(SettingsError::NotConfigured(NO_DJ_ROLE));
        };

        if !self.roles.role_exists(guild_id, role_id).await? {
            warn!("DJ role '{role_id}' of guild '{guild_id}' no longer exists, clearing it");
            // Leave a role set in the meantime alone.
            self.store.clear_dj_role_if(guild_id, role_id).await?;
            return Err(SettingsError::StaleReference(DJ_ROLE_DELETED));
        }

        Ok(Reply::info(format!(
            "This server's DJ role is {}.",
            role_id.mention()
        )))
    }

    async fn set_dj_role(
        &self,
        guild_id: Id<GuildMarker>,
        role_id: Id<RoleMarker>,
    ) -> Result<Reply, SettingsError> {
        self.store.set_dj_role_id(guild_id, Some(role_id)).await?;

        Ok(Reply::success(format!(
            "Set this server's DJ role to {}.",
            role_id.mention()
        )))
    }

    async fn reset_dj_role(&self, guild_id: Id<GuildMarker>) -> Result<Reply, SettingsError> {
        let config = self.store.get(guild_id).await?;
        if config.dj_role_id.is_none() {
            return Err(SettingsError::NotConfigured(NO_DJ_ROLE));
        }

        self.store.set_dj_role_id(guild_id, None).await?;

        Ok(Reply::success("Reset this server's DJ role."))
    }

    async fn show_embed_size(&self, guild_id: Id<GuildMarker>) -> Result<Reply, SettingsError> {
        let config = self.store.get(guild_id).await?;

        Ok(Reply::info(format!(
            "This server's embed size is `{}`.",
            config.embed_size
        )))
    }

    async fn set_embed_size(
        &self,
        guild_id: Id<GuildMarker>,
        size: EmbedSize,
    ) -> Result<Reply, SettingsError> {
        self.store.set_embed_size(guild_id, size).await?;

        Ok(Reply::success(format!(
            "Set this server's embed size to `{size}`."
        )))
    }

    async fn reset_embed_size(&self, guild_id: Id<GuildMarker>) -> Result<Reply, SettingsError> {
        let size = EmbedSize::default();
        self.store.set_embed_size(guild_id, size).await?;

        Ok(Reply::success(format!(
            "Reset this server's embed size back to `{size}`."
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use twilight_model::guild::Permissions;

    use super::*;
    use crate::config::GuildConfig;
    use crate::settings::permissions::tests::FakePermissions;
    use crate::settings::roles::tests::FakeRoles;
    use crate::settings::roles::GuildRole;

    /// In-memory store that counts every call.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryStore {
        pub guilds: Mutex<HashMap<Id<GuildMarker>, GuildConfig>>,
        pub calls: AtomicUsize,
    }

    impl MemoryStore {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn with<R>(&self, guild_id: Id<GuildMarker>, f: impl FnOnce(&mut GuildConfig) -> R) -> R {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut guilds = self.guilds.lock().unwrap();
            f(guilds
                .entry(guild_id)
                .or_insert_with(|| GuildConfig::new(guild_id)))
        }
    }

    #[async_trait]
    impl GuildConfigStore for MemoryStore {
        async fn default_prefix(&self) -> AnyResult<Prefix> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Prefix::default())
        }

        async fn get(&self, guild_id: Id<GuildMarker>) -> AnyResult<GuildConfig> {
            Ok(self.with(guild_id, |c| c.clone()))
        }

        async fn set_prefix(
            &self,
            guild_id: Id<GuildMarker>,
            prefix: Option<Prefix>,
        ) -> AnyResult<()> {
            self.with(guild_id, |c| c.prefix = prefix);
            Ok(())
        }

        async fn set_dj_role_id(
            &self,
            guild_id: Id<GuildMarker>,
            role_id: Option<Id<RoleMarker>>,
        ) -> AnyResult<()> {
            self.with(guild_id, |c| c.dj_role_id = role_id);
            Ok(())
        }

        async fn set_embed_size(&self, guild_id: Id<GuildMarker>, size: EmbedSize) -> AnyResult<()> {
            self.with(guild_id, |c| c.embed_size = size);
            Ok(())
        }

        async fn clear_dj_role_if(
            &self,
            guild_id: Id<GuildMarker>,
            role_id: Id<RoleMarker>,
        ) -> AnyResult<bool> {
            Ok(self.with(guild_id, |c| {
                let matches = c.dj_role_id == Some(role_id);
                if matches {
                    c.dj_role_id = None;
                }
                matches
            }))
        }
    }

    const GUILD: Id<GuildMarker> = Id::new(1);
    const ADMIN: Id<UserMarker> = Id::new(10);
    const MEMBER: Id<UserMarker> = Id::new(11);
    const OWNER: Id<UserMarker> = Id::new(12);
    const DJ: Id<RoleMarker> = Id::new(100);

    struct Harness {
        store: Arc<MemoryStore>,
        permissions: Arc<FakePermissions>,
        roles: Arc<FakeRoles>,
        service: SettingsService,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::default());
            let permissions = Arc::new(FakePermissions {
                owners: HashSet::from([OWNER]),
                members: HashMap::from([
                    (ADMIN, Permissions::MANAGE_GUILD),
                    (MEMBER, Permissions::SEND_MESSAGES),
                ]),
                ..Default::default()
            });
            let roles = Arc::new(FakeRoles::with(GUILD, vec![
                GuildRole::new(DJ, "DJ"),
                GuildRole::new(Id::new(101), "Mods"),
            ]));

            let service = SettingsService::new(
                Arc::clone(&store) as Arc<dyn GuildConfigStore>,
                Arc::clone(&permissions) as Arc<dyn PermissionChecker>,
                Arc::clone(&roles) as Arc<dyn RoleResolver>,
            );

            Self {
                store,
                permissions,
                roles,
                service,
            }
        }

        async fn run(&self, actor: Id<UserMarker>, op: Operation) -> Result<Reply, SettingsError> {
            self.service
                .execute(&Invocation::new(Some(GUILD), actor), op)
                .await
        }

        fn record(&self) -> GuildConfig {
            self.store
                .guilds
                .lock()
                .unwrap()
                .get(&GUILD)
                .cloned()
                .unwrap_or_else(|| GuildConfig::new(GUILD))
        }
    }

    fn prefix(s: &str) -> Prefix {
        Prefix::parse(s).unwrap()
    }

    #[tokio::test]
    async fn show_prefix_defaults_to_global() {
        let h = Harness::new();
        let reply = h.run(MEMBER, Operation::ShowPrefix).await.unwrap();

        assert_eq!(reply.tone, Tone::Info);
        assert_eq!(reply.description, "My prefix in this server is `!`");
    }

    #[tokio::test]
    async fn set_then_show_prefix() {
        let h = Harness::new();

        let reply = h
            .run(ADMIN, Operation::SetPrefix(prefix("music ")))
            .await
            .unwrap();
        assert_eq!(reply.tone, Tone::Success);
        assert_eq!(reply.description, "Set this server's prefix to `music `");

        let reply = h.run(MEMBER, Operation::ShowPrefix).await.unwrap();
        assert_eq!(reply.description, "My prefix in this server is `music `");
    }

    #[tokio::test]
    async fn reset_prefix_restores_default() {
        let h = Harness::new();

        let err = h.run(ADMIN, Operation::ResetPrefix).await.unwrap_err();
        assert!(matches!(err, SettingsError::NotConfigured(NO_PREFIX)));

        h.run(ADMIN, Operation::SetPrefix(prefix("?"))).await.unwrap();
        let reply = h.run(ADMIN, Operation::ResetPrefix).await.unwrap();
        assert_eq!(reply.description, "Reset this server's prefix to `!`");
        assert_eq!(h.record().prefix, None);

        let reply = h.run(MEMBER, Operation::ShowPrefix).await.unwrap();
        assert_eq!(reply.description, "My prefix in this server is `!`");
    }

    #[tokio::test]
    async fn set_then_show_dj_role() {
        let h = Harness::new();

        let err = h.run(MEMBER, Operation::ShowDjRole).await.unwrap_err();
        assert!(matches!(err, SettingsError::NotConfigured(NO_DJ_ROLE)));

        let reply = h.run(ADMIN, Operation::SetDjRole(DJ)).await.unwrap();
        assert_eq!(reply.description, "Set this server's DJ role to <@&100>.");

        let reply = h.run(MEMBER, Operation::ShowDjRole).await.unwrap();
        assert_eq!(reply.description, "This server's DJ role is <@&100>.");
    }

    #[tokio::test]
    async fn deleted_dj_role_is_cleared_on_read() {
        let h = Harness::new();
        h.run(ADMIN, Operation::SetDjRole(DJ)).await.unwrap();

        h.roles.delete(GUILD, DJ);

        let err = h.run(MEMBER, Operation::ShowDjRole).await.unwrap_err();
        assert!(matches!(err, SettingsError::StaleReference(DJ_ROLE_DELETED)));
        assert_eq!(h.record().dj_role_id, None);

        let err = h.run(MEMBER, Operation::ShowDjRole).await.unwrap_err();
        assert!(matches!(err, SettingsError::NotConfigured(NO_DJ_ROLE)));
    }

    /// Roles lookup during which an admin sets a new DJ role.
    struct SetDuringLookup {
        store: Arc<MemoryStore>,
        new_role: Id<RoleMarker>,
    }

    #[async_trait]
    impl RoleResolver for SetDuringLookup {
        async fn guild_roles(&self, guild_id: Id<GuildMarker>) -> AnyResult<Vec<GuildRole>> {
            self.store.set_dj_role_id(guild_id, Some(self.new_role)).await?;
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn stale_clear_keeps_role_set_meanwhile() {
        let h = Harness::new();
        h.run(ADMIN, Operation::SetDjRole(DJ)).await.unwrap();

        let mods = Id::new(101);
        let service = SettingsService::new(
            Arc::clone(&h.store) as Arc<dyn GuildConfigStore>,
            Arc::clone(&h.permissions) as Arc<dyn PermissionChecker>,
            Arc::new(SetDuringLookup {
                store: Arc::clone(&h.store),
                new_role: mods,
            }) as Arc<dyn RoleResolver>,
        );

        let err = service
            .execute(&Invocation::new(Some(GUILD), MEMBER), Operation::ShowDjRole)
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::StaleReference(DJ_ROLE_DELETED)));
        assert_eq!(h.record().dj_role_id, Some(mods));
    }

    #[tokio::test]
    async fn clear_dj_role_if_only_clears_matching_role() {
        let h = Harness::new();
        h.run(ADMIN, Operation::SetDjRole(DJ)).await.unwrap();

        assert!(!h.store.clear_dj_role_if(GUILD, Id::new(101)).await.unwrap());
        assert_eq!(h.record().dj_role_id, Some(DJ));

        assert!(h.store.clear_dj_role_if(GUILD, DJ).await.unwrap());
        assert_eq!(h.record().dj_role_id, None);
    }

    #[tokio::test]
    async fn reset_dj_role() {
        let h = Harness::new();

        let err = h.run(ADMIN, Operation::ResetDjRole).await.unwrap_err();
        assert!(matches!(err, SettingsError::NotConfigured(NO_DJ_ROLE)));

        h.run(ADMIN, Operation::SetDjRole(DJ)).await.unwrap();
        let reply = h.run(ADMIN, Operation::ResetDjRole).await.unwrap();
        assert_eq!(reply.description, "Reset this server's DJ role.");
        assert_eq!(h.record().dj_role_id, None);
    }

    #[tokio::test]
    async fn embed_size_set_and_reset() {
        let h = Harness::new();

        for size in EmbedSize::ALL {
            h.run(ADMIN, Operation::SetEmbedSize(size)).await.unwrap();
            assert_eq!(h.record().embed_size, size);
        }

        h.run(ADMIN, Operation::SetEmbedSize(EmbedSize::Medium))
            .await
            .unwrap();
        let reply = h.run(ADMIN, Operation::ResetEmbedSize).await.unwrap();
        assert_eq!(
            reply.description,
            "Reset this server's embed size back to `Large`."
        );
        assert_eq!(h.record().embed_size, EmbedSize::Large);

        // Resetting an already default size still reports the result.
        let reply = h.run(ADMIN, Operation::ResetEmbedSize).await.unwrap();
        assert_eq!(
            reply.description,
            "Reset this server's embed size back to `Large`."
        );
    }

    #[tokio::test]
    async fn unauthorized_write_never_reaches_store() {
        let h = Harness::new();

        let denied = [
            (Operation::SetPrefix(prefix("?")), Setting::Prefix),
            (Operation::ResetPrefix, Setting::Prefix),
            (Operation::SetDjRole(DJ), Setting::DjRole),
            (Operation::ResetDjRole, Setting::DjRole),
            (Operation::SetEmbedSize(EmbedSize::Small), Setting::EmbedSize),
            (Operation::ResetEmbedSize, Setting::EmbedSize),
        ];

        for (op, setting) in denied {
            let err = h.run(MEMBER, op).await.unwrap_err();
            assert!(
                matches!(err, SettingsError::Permission(m) if m == setting.denied()),
                "{setting:?}"
            );
            assert!(err.is_user_facing());
        }

        assert_eq!(h.store.calls(), 0);
    }

    #[tokio::test]
    async fn owners_pass_the_gate() {
        let h = Harness::new();

        h.run(OWNER, Operation::SetEmbedSize(EmbedSize::Small))
            .await
            .unwrap();
        assert_eq!(h.record().embed_size, EmbedSize::Small);
    }

    #[tokio::test]
    async fn outside_guild_fails_before_anything_else() {
        let h = Harness::new();
        let inv = Invocation::new(None, OWNER);

        for op in [
            Operation::ShowPrefix,
            Operation::SetPrefix(prefix("?")),
            Operation::ShowDjRole,
            Operation::ResetEmbedSize,
        ] {
            let err = h.service.execute(&inv, op).await.unwrap_err();
            assert!(matches!(err, SettingsError::Scope));
        }

        assert_eq!(h.store.calls(), 0);
        assert_eq!(h.permissions.calls(), 0);
    }

    #[tokio::test]
    async fn failed_lookup_is_unexpected() {
        let h = Harness::new();

        // Not a known member, so the permission lookup fails.
        let err = h
            .run(Id::new(99), Operation::ResetEmbedSize)
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::Unexpected(_)));
        assert!(!err.is_user_facing());
        assert_eq!(h.store.calls(), 0);
    }

    #[tokio::test]
    async fn embed_size_worked_example() {
        let h = Harness::new();

        let reply = h.run(MEMBER, Operation::ShowEmbedSize).await.unwrap();
        assert_eq!(reply.description, "This server's embed size is `Large`.");

        let reply = h
            .run(ADMIN, Operation::SetEmbedSize(EmbedSize::Small))
            .await
            .unwrap();
        assert_eq!(reply.description, "Set this server's embed size to `Small`.");

        let err = h
            .run(MEMBER, Operation::SetEmbedSize(EmbedSize::Medium))
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::Permission(_)));

        let reply = h.run(MEMBER, Operation::ShowEmbedSize).await.unwrap();
        assert_eq!(reply.description, "This server's embed size is `Small`.");
    }
}
