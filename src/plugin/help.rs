use crate::{event::*, plugin::*};
use anyhow::Result;

pub struct Help;

#[serenity::async_trait]
impl Plugin for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    async fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!("{}{} - list every command", prefix, self.name()))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, _)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        let mut lines = vec!["```".to_string(), "Available commands:".to_string()];
        for plugin in crate::plugin::plugins() {
            if let Some(usage) = plugin.usage(ctx).await {
                lines.push(usage);
            }
        }
        lines.push("```".to_string());

        msg.reply(ctx.cache_http, lines.join("\n")).await?;
        Ok(EventHandled::Yes)
    }
}
