use crate::llm::LlmCompletionRequest;
use crate::{event::*, plugin::*};
use anyhow::Result;

/// One-shot prompt completion, no conversation context.
pub struct Ask;

#[serenity::async_trait]
impl Plugin for Ask {
    fn name(&self) -> &'static str {
        "ask"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{}{} <prompt> - complete a bare prompt without chat context",
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        if args.is_empty() {
            msg.reply(ctx.cache_http, "Ask me what?  See `;help`")
                .await?;
            return Ok(EventHandled::Yes);
        }
        let prompt = args.join(" ");

        let typing = msg.channel_id.start_typing(ctx.http);

        let cfg = ctx.cfg.read().await;
        let llm_settings = cfg.llm_reply.as_llm_settings();
        let response = LlmCompletionRequest::new(prompt, &llm_settings)
            .post(ctx)
            .await?;

        msg.reply(ctx.cache_http, response).await?;
        typing.stop();
        Ok(EventHandled::Yes)
    }
}
