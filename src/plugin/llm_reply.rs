use crate::helper::MessageHelper;
use crate::llm::LlmChatRequest;
use crate::{event::*, plugin::*};
use anyhow::Result;

/// Catch-all conversation plugin: answers any message addressed to the bot
/// that no earlier plugin claimed, using recent channel history as context.
pub struct LlmReply;

#[serenity::async_trait]
impl Plugin for LlmReply {
    fn name(&self) -> &'static str {
        "llm_reply"
    }

    async fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        // Mentions and DMs only; everything else stays untouched.
        if !msg.is_to_me(ctx).await? {
            return Ok(EventHandled::No);
        }

        let typing = msg.channel_id.start_typing(ctx.http);

        let cfg = ctx.cfg.read().await;
        let llm_settings = cfg.llm_reply.as_llm_settings();
        let response = LlmChatRequest::from_recent_history(ctx, msg.channel_id, &llm_settings)
            .await?
            .post(ctx)
            .await?;

        typing.stop();
        msg.reply(ctx.cache_http, response).await?;
        Ok(EventHandled::Yes)
    }
}
