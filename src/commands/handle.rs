use std::sync::Arc;

use twilight_model::channel::Message;

use crate::commands::{self, CommandError};
use crate::settings::{Invocation, Reply};
use crate::utils::prelude::*;
use crate::utils::ExecModelExt;
use crate::{parser, Context};

/// Parse message, run the settings operation and reply with the result.
pub async fn classic_command(ctx: &Context, msg: Arc<Message>) -> Result<(), CommandError> {
    // Unprefix the message contents.
    let prefix = ctx.config.classic_prefix(msg.guild_id)?;
    let Some((_, unprefixed)) = parser::unprefix_with([&prefix], &msg.content) else {
        return Err(CommandError::NotPrefixed);
    };

    let result = execute(ctx, &msg, unprefixed).await;

    // Nothing to say if the message was not meant for us.
    let embed = match &result {
        Ok(reply) => Some(commands::reply_embed(reply)),
        Err(e) => commands::error_embed(e, &prefix),
    };

    if let Some(embed) = embed {
        ctx.http
            .create_message(msg.channel_id)
            .reply(msg.id)
            .embeds(&[embed])?
            .send()
            .await
            .context("Failed to send response message")?;

        trace!("Replied to '{}' by user '{}'", msg.id, msg.author.id);
    }

    result.map(drop)
}

async fn execute(ctx: &Context, msg: &Message, unprefixed: &str) -> Result<Reply, CommandError> {
    let (group, request) = commands::parse(unprefixed)?;

    debug!("Executing '{}' by user '{}'", group.name(), msg.author.id);

    let op = request
        .into_operation(msg.guild_id, ctx.settings.roles())
        .await?;
    let inv = Invocation::new(msg.guild_id, msg.author.id);

    Ok(ctx.settings.execute(&inv, op).await?)
}
