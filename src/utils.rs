use twilight_http::request::channel::message::CreateMessage;
use twilight_http::request::guild::member::GetMember;
use twilight_http::request::guild::role::GetGuildRoles;
use twilight_http::request::guild::GetGuild;
use twilight_model::channel::Message;
use twilight_model::guild::{Guild, Member, Role};

use crate::utils::prelude::*;

/// Common imports for the crate.
pub mod prelude {
    pub(crate) use anyhow::{Context as _, Result as AnyResult};
    pub(crate) use async_trait::async_trait;
    pub(crate) use tracing::{debug, error, info, trace, warn};
}

/// Universal constants.
pub mod consts {
    /// Characters that can wrap a classic command argument.
    pub const DELIMITERS: &[char] = &['"', '\'', '`'];

    /// Embed colour for neutral information.
    pub const COLOUR_MAIN: u32 = 0xF1_C40F;

    /// Embed colour for successful changes.
    pub const COLOUR_GREEN: u32 = 0x2E_CC71;

    /// Embed colour for failures.
    pub const COLOUR_RED: u32 = 0xE7_4C3C;
}

/// A trait to simplify `.await?.model().await` chain.
#[async_trait]
pub trait ExecModelExt {
    type Value;

    /// Send the request and deserialize the response body.
    async fn send(self) -> AnyResult<Self::Value>;
}

/// Macro to implement `ExecModelExt` in a one-liner.
macro_rules! impl_exec_model_ext {
    ($req:ty, $val:ty) => {
        impl_exec_model_ext!($req, $val, model);
    };
    ($req:ty, $val:ty, $body:ident) => {
        #[async_trait]
        impl ExecModelExt for $req {
            type Value = $val;

            async fn send(self) -> AnyResult<Self::Value> {
                self.await?.$body().await.map_err(Into::into)
            }
        }
    };
}

impl_exec_model_ext!(CreateMessage<'_>, Message);
impl_exec_model_ext!(GetGuild<'_>, Guild);
impl_exec_model_ext!(GetGuildRoles<'_>, Vec<Role>, models);
impl_exec_model_ext!(GetMember<'_>, Member);

/// Escape characters that would otherwise be rendered as markdown or mentions.
pub fn escape_discord_chars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '*' | '_' | '~' | '`' | '|' | '>' | '@') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Returns a comma separated list of quoted items, e.g. `'a', 'b', 'c'`.
pub fn nice_list<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|i| format!("'{i}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markdown() {
        assert_eq!(escape_discord_chars("a*b_c"), r"a\*b\_c");
        assert_eq!(escape_discord_chars("`@everyone`"), r"\`\@everyone\`");
        assert_eq!(escape_discord_chars("plain"), "plain");
    }

    #[test]
    fn lists_items() {
        assert_eq!(nice_list(consts::DELIMITERS), r#"'"', ''', '`'"#);
        assert_eq!(nice_list(Vec::<&str>::new()), "");
    }
}
